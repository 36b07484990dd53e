use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Phase;

mod context;
mod conventions;
mod dependencies;
mod detector;
mod framework;
mod language;
mod metadata;
mod project;
mod structure;
mod walker;

#[cfg(test)]
mod tests;

pub use context::{build_code_context, build_issue_context, IssueData};
pub use conventions::ConventionAnalyzer;
pub use dependencies::DependencyAnalyzer;
pub use detector::{HeuristicDetectors, ProjectDetectors};
pub use framework::FrameworkDetector;
pub use language::{language_for_path, LanguageDetector};
pub use metadata::MetadataExtractor;
pub use project::ProjectInfoDetector;
pub use structure::StructureAnalyzer;
pub use walker::{ProjectWalker, ScanLimits, WalkedFile};

/// Everything known about a project after one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub project_info: ProjectInfo,
    pub languages: Vec<LanguageInfo>,
    pub frameworks: Vec<FrameworkInfo>,
    pub dependencies: DependencyInfo,
    pub file_structure: FileStructure,
    pub conventions: CodingConventions,
    pub metadata: ProjectMetadata,
    pub code_context: Option<CodeContext>,
    pub issue_context: Option<IssueContext>,
    /// Set when at least one sequential phase failed.
    pub degraded: bool,
    pub phase_errors: Vec<PhaseErrorRecord>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn primary_language(&self) -> Option<&LanguageInfo> {
        self.languages.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseErrorRecord {
    pub phase: Phase,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Rust,
    Node,
    Python,
    Go,
    Java,
    Ruby,
    Php,
    Dotnet,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub project_type: ProjectType,
    pub build_system: Option<String>,
    /// Root-relative manifest and tool config files.
    pub config_files: Vec<String>,
    /// Root-relative entry point files.
    pub entry_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    pub file_count: usize,
    pub line_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    pub version: Option<String>,
    pub language: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub package_managers: Vec<String>,
    pub lock_files: Vec<String>,
    pub dependencies: Vec<Dependency>,
}

impl DependencyInfo {
    pub fn direct(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.is_dev)
    }

    pub fn dev(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.is_dev)
    }

    /// Name to version snapshot; later duplicates win.
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.dependencies
            .iter()
            .map(|d| (d.name.clone(), d.version.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub is_dev: bool,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStructure {
    pub total_files: usize,
    pub total_dirs: usize,
    pub total_size: u64,
    pub max_depth: usize,
    pub top_level_dirs: Vec<String>,
    pub extension_counts: BTreeMap<String, usize>,
    pub source_dirs: Vec<String>,
    pub test_dirs: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "style", content = "width")]
pub enum Indentation {
    Tabs,
    Spaces(usize),
    Mixed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    Lf,
    Crlf,
    Mixed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodingConventions {
    pub primary_language: Option<String>,
    pub indentation: Indentation,
    pub line_ending: LineEnding,
    pub max_line_length: usize,
    pub naming_style: Option<String>,
    pub formatter_configs: Vec<String>,
    pub linter_configs: Vec<String>,
    pub files_sampled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub readme: Option<String>,
    pub license: Option<String>,
    pub changelog: Option<String>,
    pub contributing: Option<String>,
    pub ci_providers: Vec<String>,
    pub ci_workflows: Vec<String>,
    pub docker_files: Vec<String>,
    pub has_git: bool,
    pub git_branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeContext {
    pub primary_language: Option<String>,
    pub key_files: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Bug,
    Feature,
    Documentation,
    Refactor,
    #[default]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueContext {
    pub issue_number: Option<u64>,
    pub kind: IssueKind,
    pub keywords: Vec<String>,
    pub mentioned_files: Vec<String>,
    pub relevant_files: Vec<String>,
}
