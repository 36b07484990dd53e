use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::ProjectMetadata;
use crate::context::AnalysisContext;

const README_NAMES: &[&str] = &["README.md", "README.rst", "README.txt", "README", "readme.md"];
const LICENSE_NAMES: &[&str] = &["LICENSE", "LICENSE.md", "LICENSE.txt", "LICENCE", "COPYING"];
const CHANGELOG_NAMES: &[&str] = &["CHANGELOG.md", "CHANGELOG", "CHANGES.md", "HISTORY.md"];
const CONTRIBUTING_NAMES: &[&str] = &["CONTRIBUTING.md", "CONTRIBUTING", ".github/CONTRIBUTING.md"];
const DOCKER_FILES: &[&str] = &[
    "Dockerfile",
    "Containerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    ".dockerignore",
];

const CI_PROVIDERS: &[(&str, &str)] = &[
    (".github/workflows", "GitHub Actions"),
    (".gitlab-ci.yml", "GitLab CI"),
    (".circleci/config.yml", "CircleCI"),
    (".travis.yml", "Travis CI"),
    ("Jenkinsfile", "Jenkins"),
    ("azure-pipelines.yml", "Azure Pipelines"),
    ("bitbucket-pipelines.yml", "Bitbucket Pipelines"),
];

/// License fingerprints, checked against the first lines of the license file.
const LICENSE_SIGNATURES: &[(&str, &str)] = &[
    ("MIT License", "MIT"),
    ("Permission is hereby granted, free of charge", "MIT"),
    ("Apache License", "Apache-2.0"),
    ("GNU AFFERO GENERAL PUBLIC LICENSE", "AGPL-3.0"),
    ("GNU LESSER GENERAL PUBLIC LICENSE", "LGPL"),
    ("GNU GENERAL PUBLIC LICENSE", "GPL"),
    ("Mozilla Public License", "MPL-2.0"),
    ("BSD 3-Clause", "BSD-3-Clause"),
    ("BSD 2-Clause", "BSD-2-Clause"),
    ("Redistribution and use in source and binary forms", "BSD"),
    ("This is free and unencumbered software", "Unlicense"),
    ("ISC License", "ISC"),
];

pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, ctx: &AnalysisContext, root: &Path) -> Result<ProjectMetadata> {
        ctx.check()?;

        let mut metadata = ProjectMetadata {
            readme: first_present(root, README_NAMES),
            changelog: first_present(root, CHANGELOG_NAMES),
            contributing: first_present(root, CONTRIBUTING_NAMES),
            docker_files: DOCKER_FILES
                .iter()
                .filter(|f| root.join(f).is_file())
                .map(|f| f.to_string())
                .collect(),
            has_git: root.join(".git").exists(),
            ..ProjectMetadata::default()
        };

        if let Some(license_file) = first_present(root, LICENSE_NAMES) {
            let content = fs::read_to_string(root.join(&license_file))
                .with_context(|| format!("failed to read {}", license_file))?;
            metadata.license = Some(identify_license(&content).unwrap_or("Custom").to_string());
        }

        for (marker, provider) in CI_PROVIDERS {
            if root.join(marker).exists() {
                metadata.ci_providers.push(provider.to_string());
            }
        }

        ctx.check()?;
        metadata.ci_workflows = github_workflows(&root.join(".github/workflows"))?;
        metadata.git_branch = git_branch(root);

        Ok(metadata)
    }
}

fn first_present(root: &Path, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|c| root.join(c).is_file())
        .map(|c| c.to_string())
}

fn identify_license(content: &str) -> Option<&'static str> {
    let head: String = content.lines().take(30).collect::<Vec<_>>().join("\n");
    LICENSE_SIGNATURES
        .iter()
        .find(|(needle, _)| head.contains(needle))
        .map(|(_, id)| *id)
}

/// Workflow display names, falling back to the file stem.
fn github_workflows(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut workflows = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !is_yaml {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read_to_string(&path)?;
        let name = match serde_yaml::from_str::<serde_yaml::Value>(&content) {
            Ok(doc) => doc
                .get("name")
                .and_then(|n| n.as_str())
                .map(String::from)
                .unwrap_or(stem),
            Err(e) => {
                debug!(workflow = %path.display(), error = %e, "unparseable workflow file");
                stem
            }
        };
        workflows.push(name);
    }

    Ok(workflows)
}

fn git_branch(root: &Path) -> Option<String> {
    let head = fs::read_to_string(root.join(".git/HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(String::from)
}
