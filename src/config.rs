use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::AnalysisError;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10_000;
pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
/// Ten years; anything longer is indistinguishable from "never expires".
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub const DEFAULT_MAX_MEMORY_ENTRIES: usize = 50;
pub const DEFAULT_EVICTION_BATCH: usize = 5;

const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "*.min.js",
    "*.lock",
];

/// Tunables for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub project_root: PathBuf,
    /// Files larger than this are counted but never read.
    pub max_file_size: u64,
    #[validate(range(min = 1))]
    pub max_files: usize,
    pub ignore_patterns: Vec<String>,
    #[validate(range(min = 1, max = 64))]
    pub max_workers: usize,
    pub cache: CacheConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_workers: DEFAULT_MAX_WORKERS,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[validate(range(min = 1, max = 315360000))]
    pub ttl_secs: u64,
    #[validate(range(min = 1))]
    pub max_memory_entries: usize,
    pub eviction_batch: usize,
    pub namespace: CacheNamespace,
    /// Explicit cache directory, used as-is when set.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
            eviction_batch: DEFAULT_EVICTION_BATCH,
            namespace: CacheNamespace::PerProcess,
            directory: None,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime, clamped to [`MAX_CACHE_TTL_SECS`] for configs built
    /// without going through validation.
    pub fn ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.ttl_secs.min(MAX_CACHE_TTL_SECS)).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }
}

/// How the disk tier is partitioned between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// `proc-<pid>` subdirectory; processes never share entries.
    PerProcess,
    /// One directory for every process, so separate invocations can hit.
    Shared,
}

impl AnalyzerConfig {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        self.validate()
            .and_then(|_| self.cache.validate())
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                AnalysisError::InvalidConfig(format!("ignore pattern {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Loads the default config file when present, otherwise returns defaults.
    pub fn load_or_default() -> Result<Self> {
        match get_config_path() {
            Ok(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "codescout", "codescout")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}
