use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::config::AnalyzerConfig;
use crate::context::AnalysisContext;

/// Limits applied to every walk of the project tree.
#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub max_file_size: u64,
    pub max_files: usize,
    ignore: Vec<Pattern>,
}

impl ScanLimits {
    /// Unparseable patterns are dropped with a warning; `AnalyzerConfig::check`
    /// rejects them up front.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let ignore = config
            .ignore_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "skipping invalid ignore pattern");
                    None
                }
            })
            .collect();

        Self {
            max_file_size: config.max_file_size,
            max_files: config.max_files,
            ignore,
        }
    }

    pub fn is_ignored(&self, name: &str, relative: &Path) -> bool {
        self.ignore
            .iter()
            .any(|p| p.matches(name) || p.matches_path(relative))
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self::from_config(&AnalyzerConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Root-relative, always `/`-separated.
    pub relative: String,
    pub size: u64,
    pub depth: usize,
}

impl WalkedFile {
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<WalkedFile>,
    pub dirs: Vec<String>,
    pub truncated: bool,
}

pub struct ProjectWalker<'a> {
    root: &'a Path,
    limits: &'a ScanLimits,
}

impl<'a> ProjectWalker<'a> {
    pub fn new(root: &'a Path, limits: &'a ScanLimits) -> Self {
        Self { root, limits }
    }

    /// Walks the tree, checking `ctx` before every entry.
    pub fn walk(&self, ctx: &AnalysisContext) -> Result<WalkOutcome> {
        let mut outcome = WalkOutcome::default();
        let walker = WalkDir::new(self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.ignored(e));

        for entry in walker {
            ctx.check()?;
            let entry = entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            if entry.depth() == 0 {
                continue;
            }

            let relative = relative_path(self.root, entry.path());
            if entry.file_type().is_dir() {
                outcome.dirs.push(relative);
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            if outcome.files.len() >= self.limits.max_files {
                warn!(
                    root = %self.root.display(),
                    max_files = self.limits.max_files,
                    "file limit reached, remaining files skipped"
                );
                outcome.truncated = true;
                break;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            outcome.files.push(WalkedFile {
                path: entry.path().to_path_buf(),
                relative,
                size,
                depth: entry.depth(),
            });
        }

        Ok(outcome)
    }

    fn ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        let relative = entry.path().strip_prefix(self.root).unwrap_or(entry.path());
        self.limits.is_ignored(&name, relative)
    }
}

/// Runs a synchronous scan of `root` on tokio's blocking pool.
pub async fn run_blocking<T, F>(ctx: &AnalysisContext, root: &Path, scan: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AnalysisContext, &Path) -> Result<T> + Send + 'static,
{
    let ctx = ctx.clone();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&ctx, &root))
        .await
        .context("blocking scan task failed")?
}

pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
