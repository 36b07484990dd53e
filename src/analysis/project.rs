use anyhow::Result;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use toml::Value as TomlValue;
use tracing::debug;

use super::walker::{relative_path, run_blocking};
use super::{ProjectInfo, ProjectType};
use crate::context::AnalysisContext;

/// Manifest files that decide the project type, in priority order.
const PROJECT_MARKERS: &[(&str, ProjectType, &str)] = &[
    ("Cargo.toml", ProjectType::Rust, "cargo"),
    ("package.json", ProjectType::Node, "npm"),
    ("pyproject.toml", ProjectType::Python, "pyproject"),
    ("setup.py", ProjectType::Python, "setuptools"),
    ("requirements.txt", ProjectType::Python, "pip"),
    ("go.mod", ProjectType::Go, "go"),
    ("pom.xml", ProjectType::Java, "maven"),
    ("build.gradle", ProjectType::Java, "gradle"),
    ("build.gradle.kts", ProjectType::Java, "gradle"),
    ("Gemfile", ProjectType::Ruby, "bundler"),
    ("composer.json", ProjectType::Php, "composer"),
];

/// Tool configuration files reported alongside manifests.
const TOOL_CONFIG_FILES: &[&str] = &[
    "Cargo.lock",
    "rust-toolchain.toml",
    "rustfmt.toml",
    "clippy.toml",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "tsconfig.json",
    "vite.config.ts",
    "webpack.config.js",
    "setup.cfg",
    "tox.ini",
    "Pipfile",
    "poetry.lock",
    "go.sum",
    "Makefile",
    "Dockerfile",
    "docker-compose.yml",
    ".editorconfig",
];

const ENTRY_POINTS: &[(ProjectType, &[&str])] = &[
    (
        ProjectType::Rust,
        &["src/main.rs", "src/lib.rs", "src/bin/*.rs"],
    ),
    (
        ProjectType::Node,
        &[
            "index.js",
            "index.ts",
            "src/index.js",
            "src/index.ts",
            "src/main.ts",
            "src/main.js",
            "server.js",
            "app.js",
        ],
    ),
    (
        ProjectType::Python,
        &["main.py", "app.py", "manage.py", "__main__.py", "src/*/__main__.py"],
    ),
    (ProjectType::Go, &["main.go", "cmd/*/main.go"]),
    (
        ProjectType::Java,
        &["src/main/java/**/Main.java", "src/main/java/**/Application.java"],
    ),
    (ProjectType::Ruby, &["config.ru", "bin/rails", "lib/*.rb"]),
    (ProjectType::Php, &["index.php", "public/index.php", "artisan"]),
    (ProjectType::Dotnet, &["Program.cs"]),
];

#[derive(Clone, Copy, Default)]
pub struct ProjectInfoDetector;

impl ProjectInfoDetector {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, ctx: &AnalysisContext, path: &Path) -> Result<ProjectInfo> {
        let detector = *self;
        run_blocking(ctx, path, move |ctx, path| detector.scan(ctx, path)).await
    }

    pub fn scan(&self, ctx: &AnalysisContext, path: &Path) -> Result<ProjectInfo> {
        ctx.check()?;

        let mut info = ProjectInfo {
            name: dir_name(path),
            ..ProjectInfo::default()
        };

        for (file, project_type, build_system) in PROJECT_MARKERS {
            if !path.join(file).is_file() {
                continue;
            }
            info.config_files.push(file.to_string());
            if info.project_type == ProjectType::Unknown {
                info.project_type = *project_type;
                info.build_system = Some(build_system.to_string());
            }
        }

        if info.project_type == ProjectType::Unknown {
            if let Some(csproj) = find_csproj(path)? {
                info.config_files.push(csproj);
                info.project_type = ProjectType::Dotnet;
                info.build_system = Some("dotnet".to_string());
            }
        }

        for file in TOOL_CONFIG_FILES {
            if path.join(file).is_file() {
                info.config_files.push(file.to_string());
            }
        }

        ctx.check()?;
        self.read_manifest(path, &mut info);
        info.entry_points = find_entry_points(path, info.project_type);
        for entry in package_json_entries(path) {
            if !info.entry_points.contains(&entry) {
                info.entry_points.push(entry);
            }
        }

        Ok(info)
    }

    /// Best effort: a malformed manifest leaves name and version at their fallbacks.
    fn read_manifest(&self, path: &Path, info: &mut ProjectInfo) {
        let fields = match info.project_type {
            ProjectType::Rust => read_toml(&path.join("Cargo.toml")).map(|toml| {
                let package = toml
                    .get("package")
                    .or_else(|| toml.get("workspace").and_then(|w| w.get("package")));
                (
                    toml_str(package, "name"),
                    toml_str(package, "version"),
                    toml_str(package, "description"),
                )
            }),
            ProjectType::Node => read_json(&path.join("package.json")).map(|json| {
                (
                    json_str(&json, "name"),
                    json_str(&json, "version"),
                    json_str(&json, "description"),
                )
            }),
            ProjectType::Python => read_toml(&path.join("pyproject.toml")).map(|toml| {
                let table = toml
                    .get("project")
                    .or_else(|| toml.get("tool").and_then(|t| t.get("poetry")));
                (
                    toml_str(table, "name"),
                    toml_str(table, "version"),
                    toml_str(table, "description"),
                )
            }),
            ProjectType::Go => fs::read_to_string(path.join("go.mod")).ok().map(|content| {
                let module = content
                    .lines()
                    .find_map(|l| l.trim().strip_prefix("module "))
                    .map(|m| m.trim().to_string());
                (module, None, None)
            }),
            _ => None,
        };

        if let Some((name, version, description)) = fields {
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                info.name = name;
            }
            info.version = version;
            info.description = description;
        }
    }
}

fn dir_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First `*.csproj` in the root by name, so repeated runs agree.
fn find_csproj(path: &Path) -> Result<Option<String>> {
    let mut found: Vec<String> = fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("csproj"))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

fn find_entry_points(path: &Path, project_type: ProjectType) -> Vec<String> {
    let patterns = ENTRY_POINTS
        .iter()
        .find(|(t, _)| *t == project_type)
        .map(|(_, patterns)| *patterns)
        .unwrap_or(&[]);

    let mut found = Vec::new();
    for pattern in patterns {
        let Some(root) = path.to_str() else {
            break;
        };
        let full = format!("{}/{}", glob::Pattern::escape(root), pattern);
        let matches = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(e) => {
                debug!(pattern = %pattern, error = %e, "bad entry point pattern");
                continue;
            }
        };
        for entry in matches.filter_map(Result::ok) {
            if entry.is_file() {
                let relative = relative_path(path, &entry);
                if !found.contains(&relative) {
                    found.push(relative);
                }
            }
        }
    }
    found
}

/// `main` plus every `bin` target, which is either one path or a name to path map.
fn package_json_entries(path: &Path) -> Vec<String> {
    let Some(json) = read_json(&path.join("package.json")) else {
        return Vec::new();
    };

    let main = json.get("main").and_then(JsonValue::as_str);
    let bins: Vec<&str> = match json.get("bin") {
        Some(JsonValue::String(bin)) => vec![bin.as_str()],
        Some(JsonValue::Object(map)) => map.values().filter_map(JsonValue::as_str).collect(),
        _ => Vec::new(),
    };

    let mut entries = Vec::new();
    for target in main.into_iter().chain(bins) {
        let target = target.trim_start_matches("./").to_string();
        if path.join(&target).is_file() && !entries.contains(&target) {
            entries.push(target);
        }
    }
    entries
}

fn read_toml(path: &Path) -> Option<TomlValue> {
    let content = fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

fn read_json(path: &Path) -> Option<JsonValue> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn toml_str(table: Option<&TomlValue>, key: &str) -> Option<String> {
    table?.get(key)?.as_str().map(String::from)
}

fn json_str(json: &JsonValue, key: &str) -> Option<String> {
    json.get(key)?.as_str().map(String::from)
}
