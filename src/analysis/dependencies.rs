use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use toml::Value as TomlValue;

use super::{Dependency, DependencyInfo, ProjectInfo};
use crate::context::AnalysisContext;

pub struct DependencyAnalyzer {
    dependency_parsers: Vec<Box<dyn DependencyParser + Send + Sync>>,
}

#[async_trait::async_trait]
trait DependencyParser {
    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>>;
    fn get_file_pattern(&self) -> &str;
    fn package_manager(&self) -> &str;
    fn lock_files(&self) -> &[&str];
}

struct RustDependencyParser;
struct NodeDependencyParser;
struct PythonDependencyParser;
struct PoetryDependencyParser;
struct GoDependencyParser;

fn toml_version(value: &TomlValue) -> String {
    match value {
        TomlValue::String(v) => v.clone(),
        TomlValue::Table(t) => t
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("*")
            .to_string(),
        _ => "*".to_string(),
    }
}

#[async_trait::async_trait]
impl DependencyParser for RustDependencyParser {
    fn get_file_pattern(&self) -> &str {
        "Cargo.toml"
    }

    fn package_manager(&self) -> &str {
        "cargo"
    }

    fn lock_files(&self) -> &[&str] {
        &["Cargo.lock"]
    }

    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>> {
        let cargo_path = path.join(self.get_file_pattern());
        let content = fs::read_to_string(&cargo_path)?;
        let cargo_toml: TomlValue = toml::from_str(&content)
            .with_context(|| format!("malformed {}", cargo_path.display()))?;

        let mut deps = Vec::new();
        let sections = [
            ("dependencies", false),
            ("dev-dependencies", true),
            ("build-dependencies", false),
        ];
        for (section, is_dev) in sections {
            if let Some(table) = cargo_toml.get(section).and_then(|d| d.as_table()) {
                for (name, version) in table {
                    deps.push(Dependency {
                        name: name.clone(),
                        version: toml_version(version),
                        is_dev,
                        source: "crates.io".to_string(),
                    });
                }
            }
        }

        // Workspace roots declare shared versions instead.
        if let Some(table) = cargo_toml
            .get("workspace")
            .and_then(|w| w.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, version) in table {
                deps.push(Dependency {
                    name: name.clone(),
                    version: toml_version(version),
                    is_dev: false,
                    source: "crates.io".to_string(),
                });
            }
        }

        Ok(deps)
    }
}

#[async_trait::async_trait]
impl DependencyParser for NodeDependencyParser {
    fn get_file_pattern(&self) -> &str {
        "package.json"
    }

    fn package_manager(&self) -> &str {
        "npm"
    }

    fn lock_files(&self) -> &[&str] {
        &["package-lock.json", "yarn.lock", "pnpm-lock.yaml"]
    }

    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>> {
        let package_path = path.join(self.get_file_pattern());
        let content = fs::read_to_string(&package_path)?;
        let package_json: JsonValue = serde_json::from_str(&content)
            .with_context(|| format!("malformed {}", package_path.display()))?;

        let mut deps = Vec::new();
        for (section, is_dev) in [("dependencies", false), ("devDependencies", true)] {
            if let Some(table) = package_json.get(section).and_then(|d| d.as_object()) {
                for (name, version) in table {
                    deps.push(Dependency {
                        name: name.clone(),
                        version: version.as_str().unwrap_or("*").to_string(),
                        is_dev,
                        source: "npm".to_string(),
                    });
                }
            }
        }

        Ok(deps)
    }
}

#[async_trait::async_trait]
impl DependencyParser for PythonDependencyParser {
    fn get_file_pattern(&self) -> &str {
        "requirements.txt"
    }

    fn package_manager(&self) -> &str {
        "pip"
    }

    fn lock_files(&self) -> &[&str] {
        &["Pipfile.lock"]
    }

    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path.join(self.get_file_pattern()))?;

        let mut deps = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }

            let (name, version) = split_specifier(line);
            deps.push(Dependency {
                name,
                version,
                is_dev: false,
                source: "pip".to_string(),
            });
        }

        Ok(deps)
    }
}

#[async_trait::async_trait]
impl DependencyParser for PoetryDependencyParser {
    fn get_file_pattern(&self) -> &str {
        "pyproject.toml"
    }

    fn package_manager(&self) -> &str {
        "poetry"
    }

    fn lock_files(&self) -> &[&str] {
        &["poetry.lock", "uv.lock"]
    }

    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>> {
        let pyproject_path = path.join(self.get_file_pattern());
        let content = fs::read_to_string(&pyproject_path)?;
        let pyproject: TomlValue = toml::from_str(&content)
            .with_context(|| format!("malformed {}", pyproject_path.display()))?;

        let mut deps = Vec::new();

        // PEP 621
        if let Some(list) = pyproject
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
        {
            for spec in list.iter().filter_map(|v| v.as_str()) {
                let (name, version) = split_specifier(spec);
                deps.push(Dependency {
                    name,
                    version,
                    is_dev: false,
                    source: "pypi".to_string(),
                });
            }
        }

        if let Some(poetry) = pyproject.get("tool").and_then(|t| t.get("poetry")) {
            let sections = [
                (poetry.get("dependencies"), false),
                (poetry.get("dev-dependencies"), true),
                (
                    poetry
                        .get("group")
                        .and_then(|g| g.get("dev"))
                        .and_then(|d| d.get("dependencies")),
                    true,
                ),
            ];
            for (table, is_dev) in sections {
                let Some(table) = table.and_then(|t| t.as_table()) else {
                    continue;
                };
                for (name, version) in table {
                    if name == "python" {
                        continue;
                    }
                    deps.push(Dependency {
                        name: name.clone(),
                        version: toml_version(version),
                        is_dev,
                        source: "poetry".to_string(),
                    });
                }
            }
        }

        Ok(deps)
    }
}

#[async_trait::async_trait]
impl DependencyParser for GoDependencyParser {
    fn get_file_pattern(&self) -> &str {
        "go.mod"
    }

    fn package_manager(&self) -> &str {
        "go modules"
    }

    fn lock_files(&self) -> &[&str] {
        &["go.sum"]
    }

    async fn parse_dependencies(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path.join(self.get_file_pattern()))?;

        let mut deps = Vec::new();
        let mut in_block = false;
        for line in content.lines() {
            let line = line.trim();
            let spec = if in_block {
                if line == ")" {
                    in_block = false;
                    continue;
                }
                line
            } else if line == "require (" {
                in_block = true;
                continue;
            } else if let Some(single) = line.strip_prefix("require ") {
                single
            } else {
                continue;
            };

            let mut parts = spec.split_whitespace();
            let (Some(module), Some(version)) = (parts.next(), parts.next()) else {
                continue;
            };
            deps.push(Dependency {
                name: module.to_string(),
                version: version.to_string(),
                // `// indirect` marks a transitive requirement, not a dev-only one.
                is_dev: false,
                source: "go".to_string(),
            });
        }

        Ok(deps)
    }
}

fn split_specifier(spec: &str) -> (String, String) {
    let idx = spec
        .find(|c: char| matches!(c, '=' | '>' | '<' | '~' | '!' | ';' | '[' | ' '))
        .unwrap_or(spec.len());
    let name = spec[..idx].trim().to_string();
    let version = spec[idx..]
        .split(';')
        .next()
        .map(|v| v.trim_start_matches(|c: char| c == '[' || c.is_alphanumeric() || c == ']'))
        .map(|v| v.trim_start_matches(|c: char| matches!(c, '=' | ' ')).trim())
        .filter(|v| !v.is_empty())
        .unwrap_or("*")
        .to_string();
    (name, version)
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self {
            dependency_parsers: vec![
                Box::new(RustDependencyParser),
                Box::new(NodeDependencyParser),
                Box::new(PythonDependencyParser),
                Box::new(PoetryDependencyParser),
                Box::new(GoDependencyParser),
            ],
        }
    }

    /// Runs the parsers whose manifest the project info reported.
    pub async fn analyze(
        &self,
        ctx: &AnalysisContext,
        path: &Path,
        info: &ProjectInfo,
    ) -> Result<DependencyInfo> {
        let mut result = DependencyInfo::default();

        for parser in &self.dependency_parsers {
            ctx.check()?;
            let manifest = parser.get_file_pattern();
            if !info.config_files.iter().any(|f| f == manifest) {
                continue;
            }

            let deps = parser
                .parse_dependencies(path)
                .await
                .with_context(|| format!("failed to parse dependencies from {}", manifest))?;
            result.package_managers.push(parser.package_manager().to_string());
            for lock in parser.lock_files() {
                if path.join(lock).is_file() && !result.lock_files.iter().any(|l| l == lock) {
                    result.lock_files.push(lock.to_string());
                }
            }
            result.dependencies.extend(deps);
        }

        Ok(result)
    }
}
