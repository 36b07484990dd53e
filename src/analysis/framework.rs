use anyhow::Result;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use toml::Value as TomlValue;

use super::walker::run_blocking;
use super::FrameworkInfo;
use crate::context::AnalysisContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Manifest {
    PackageJson,
    CargoToml,
    Requirements,
    PyProject,
    GoMod,
    Gemfile,
    ComposerJson,
    PomXml,
}

impl Manifest {
    fn file_name(&self) -> &'static str {
        match self {
            Self::PackageJson => "package.json",
            Self::CargoToml => "Cargo.toml",
            Self::Requirements => "requirements.txt",
            Self::PyProject => "pyproject.toml",
            Self::GoMod => "go.mod",
            Self::Gemfile => "Gemfile",
            Self::ComposerJson => "composer.json",
            Self::PomXml => "pom.xml",
        }
    }
}

struct FrameworkPattern {
    name: &'static str,
    language: &'static str,
    manifest: Manifest,
    /// Dependency name (or module path) that identifies the framework.
    needle: &'static str,
}

const fn pattern(
    name: &'static str,
    language: &'static str,
    manifest: Manifest,
    needle: &'static str,
) -> FrameworkPattern {
    FrameworkPattern {
        name,
        language,
        manifest,
        needle,
    }
}

static FRAMEWORK_PATTERNS: &[FrameworkPattern] = &[
    pattern("Next.js", "JavaScript", Manifest::PackageJson, "next"),
    pattern("React", "JavaScript", Manifest::PackageJson, "react"),
    pattern("Vue", "JavaScript", Manifest::PackageJson, "vue"),
    pattern("Angular", "TypeScript", Manifest::PackageJson, "@angular/core"),
    pattern("Svelte", "JavaScript", Manifest::PackageJson, "svelte"),
    pattern("Express", "JavaScript", Manifest::PackageJson, "express"),
    pattern("NestJS", "TypeScript", Manifest::PackageJson, "@nestjs/core"),
    pattern("Jest", "JavaScript", Manifest::PackageJson, "jest"),
    pattern("Actix Web", "Rust", Manifest::CargoToml, "actix-web"),
    pattern("Axum", "Rust", Manifest::CargoToml, "axum"),
    pattern("Rocket", "Rust", Manifest::CargoToml, "rocket"),
    pattern("Tokio", "Rust", Manifest::CargoToml, "tokio"),
    pattern("Bevy", "Rust", Manifest::CargoToml, "bevy"),
    pattern("Django", "Python", Manifest::Requirements, "django"),
    pattern("Flask", "Python", Manifest::Requirements, "flask"),
    pattern("FastAPI", "Python", Manifest::Requirements, "fastapi"),
    pattern("Django", "Python", Manifest::PyProject, "django"),
    pattern("Flask", "Python", Manifest::PyProject, "flask"),
    pattern("FastAPI", "Python", Manifest::PyProject, "fastapi"),
    pattern("Gin", "Go", Manifest::GoMod, "github.com/gin-gonic/gin"),
    pattern("Echo", "Go", Manifest::GoMod, "github.com/labstack/echo"),
    pattern("Fiber", "Go", Manifest::GoMod, "github.com/gofiber/fiber"),
    pattern("Rails", "Ruby", Manifest::Gemfile, "rails"),
    pattern("Laravel", "PHP", Manifest::ComposerJson, "laravel/framework"),
    pattern("Symfony", "PHP", Manifest::ComposerJson, "symfony/framework-bundle"),
    pattern("Spring Boot", "Java", Manifest::PomXml, "spring-boot"),
];

/// Dependency name to declared version for one manifest.
type DeclaredDeps = HashMap<String, Option<String>>;

#[derive(Clone, Copy, Default)]
pub struct FrameworkDetector;

impl FrameworkDetector {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, ctx: &AnalysisContext, path: &Path) -> Result<Vec<FrameworkInfo>> {
        let detector = *self;
        run_blocking(ctx, path, move |ctx, path| detector.scan(ctx, path)).await
    }

    pub fn scan(&self, ctx: &AnalysisContext, path: &Path) -> Result<Vec<FrameworkInfo>> {
        let mut manifests: HashMap<Manifest, Option<DeclaredDeps>> = HashMap::new();
        let mut frameworks: Vec<FrameworkInfo> = Vec::new();

        for pattern in FRAMEWORK_PATTERNS {
            ctx.check()?;
            let declared = manifests
                .entry(pattern.manifest)
                .or_insert_with(|| read_declared(path, pattern.manifest));
            let Some(declared) = declared else {
                continue;
            };
            if frameworks.iter().any(|f| f.name == pattern.name) {
                continue;
            }

            if let Some((matched, version)) = find_needle(declared, pattern.needle) {
                frameworks.push(FrameworkInfo {
                    name: pattern.name.to_string(),
                    version: version.clone(),
                    language: pattern.language.to_string(),
                    confidence: calculate_confidence(matched == pattern.needle, version.is_some()),
                });
            }
        }

        Ok(frameworks)
    }
}

fn find_needle<'a>(
    declared: &'a DeclaredDeps,
    needle: &str,
) -> Option<(&'a str, &'a Option<String>)> {
    if let Some((name, version)) = declared.get_key_value(needle) {
        return Some((name.as_str(), version));
    }
    // Module paths carry major-version suffixes (`.../echo/v4`).
    declared
        .iter()
        .find(|(name, _)| needle.contains('/') && name.starts_with(needle))
        .map(|(name, version)| (name.as_str(), version))
}

fn calculate_confidence(exact_name: bool, has_version: bool) -> f32 {
    let mut confidence = 0.5; // Base confidence

    if exact_name {
        confidence += 0.3;
    }
    if has_version {
        confidence += 0.2;
    }

    confidence
}

fn read_declared(root: &Path, manifest: Manifest) -> Option<DeclaredDeps> {
    let content = fs::read_to_string(root.join(manifest.file_name())).ok()?;
    let deps = match manifest {
        Manifest::PackageJson => {
            let json: JsonValue = serde_json::from_str(&content).ok()?;
            ["dependencies", "devDependencies", "peerDependencies"]
                .iter()
                .filter_map(|section| json.get(section)?.as_object())
                .flatten()
                .map(|(name, v)| (name.clone(), v.as_str().map(clean_version)))
                .collect()
        }
        Manifest::CargoToml => {
            let toml: TomlValue = toml::from_str(&content).ok()?;
            ["dependencies", "dev-dependencies"]
                .iter()
                .filter_map(|section| toml.get(section)?.as_table())
                .flatten()
                .map(|(name, v)| {
                    let version = match v {
                        TomlValue::String(s) => Some(s.clone()),
                        TomlValue::Table(t) => {
                            t.get("version").and_then(|v| v.as_str()).map(String::from)
                        }
                        _ => None,
                    };
                    (name.clone(), version)
                })
                .collect()
        }
        Manifest::Requirements => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                let (name, version) = split_requirement(l);
                (name.to_lowercase(), version)
            })
            .collect(),
        Manifest::PyProject => {
            let toml: TomlValue = toml::from_str(&content).ok()?;
            let mut deps = DeclaredDeps::new();
            if let Some(list) = toml
                .get("project")
                .and_then(|p| p.get("dependencies"))
                .and_then(|d| d.as_array())
            {
                for spec in list.iter().filter_map(|v| v.as_str()) {
                    let (name, version) = split_requirement(spec);
                    deps.insert(name.to_lowercase(), version);
                }
            }
            if let Some(table) = toml
                .get("tool")
                .and_then(|t| t.get("poetry"))
                .and_then(|p| p.get("dependencies"))
                .and_then(|d| d.as_table())
            {
                for (name, v) in table {
                    deps.insert(name.to_lowercase(), v.as_str().map(clean_version));
                }
            }
            deps
        }
        Manifest::GoMod => content
            .lines()
            .map(str::trim)
            .map(|l| l.strip_prefix("require ").unwrap_or(l))
            .filter_map(|l| {
                let mut parts = l.split_whitespace();
                let module = parts.next()?;
                let version = parts.next()?;
                version
                    .starts_with('v')
                    .then(|| (module.to_string(), Some(version.to_string())))
            })
            .collect(),
        Manifest::Gemfile => content
            .lines()
            .map(str::trim)
            .filter_map(|l| l.strip_prefix("gem "))
            .filter_map(|l| {
                let mut parts = l
                    .split(',')
                    .map(|p| p.trim().trim_matches(|c: char| c == '\'' || c == '"'));
                let name = parts.next()?.to_string();
                let version = parts.next().map(clean_version);
                Some((name, version))
            })
            .collect(),
        Manifest::ComposerJson => {
            let json: JsonValue = serde_json::from_str(&content).ok()?;
            ["require", "require-dev"]
                .iter()
                .filter_map(|section| json.get(section)?.as_object())
                .flatten()
                .map(|(name, v)| (name.clone(), v.as_str().map(clean_version)))
                .collect()
        }
        Manifest::PomXml => content
            .lines()
            .filter_map(|l| {
                let l = l.trim();
                let inner = l.strip_prefix("<artifactId>")?.strip_suffix("</artifactId>")?;
                Some((inner.to_string(), None))
            })
            .flat_map(|(artifact, version): (String, Option<String>)| {
                // spring-boot-starter-web and friends collapse onto the framework needle.
                let mut entries = vec![(artifact.clone(), version.clone())];
                if artifact.starts_with("spring-boot") {
                    entries.push(("spring-boot".to_string(), version));
                }
                entries
            })
            .collect(),
    };
    Some(deps)
}

fn split_requirement(spec: &str) -> (String, Option<String>) {
    let idx = spec
        .find(|c: char| matches!(c, '=' | '>' | '<' | '~' | '!' | ';' | '[' | ' '))
        .unwrap_or(spec.len());
    let name = spec[..idx].trim().to_string();
    let version = spec[idx..]
        .trim_start_matches(|c: char| matches!(c, '=' | '>' | '<' | '~' | '!' | ' '))
        .split(|c: char| c == ',' || c == ';')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(String::from);
    (name, version)
}

fn clean_version(raw: &str) -> String {
    raw.trim_start_matches(|c: char| matches!(c, '^' | '~' | '=' | '>' | '<' | 'v' | ' '))
        .to_string()
}
