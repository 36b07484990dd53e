use crate::analysis::{
    DependencyInfo, FrameworkInfo, HeuristicDetectors, LanguageInfo, ProjectDetectors, ProjectInfo,
};
use crate::config::{AnalyzerConfig, CacheConfig};
use crate::context::AnalysisContext;
use crate::error::{AnalysisError, Phase};
use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

mod analysis_flow;
mod error_handling;

// Test utilities and helpers
pub(crate) struct TestUtils {
    pub cache_dir: TempDir,
}

impl TestUtils {
    pub fn new() -> Self {
        Self {
            cache_dir: TempDir::new().unwrap(),
        }
    }

    /// Config whose disk tier lives in a private temp directory.
    pub fn config(&self, root: &Path) -> AnalyzerConfig {
        AnalyzerConfig::new(root).with_cache(CacheConfig {
            directory: Some(self.cache_dir.path().join("analysis")),
            ..CacheConfig::default()
        })
    }

    pub fn create_go_project() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("main.go"),
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("go.mod"), "module test\n\ngo 1.21\n").unwrap();
        temp_dir
    }

    /// A Node project whose manifest cannot be parsed.
    pub fn create_broken_node_project() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("package.json"), "{ \"name\": \"broken\", ").unwrap();
        fs::write(temp_dir.path().join("index.js"), "console.log('hi');\n").unwrap();
        temp_dir
    }
}

/// Wraps the real detectors, counting project-info calls and optionally
/// failing one concurrent phase.
pub(crate) struct ScriptedDetectors {
    inner: HeuristicDetectors,
    pub fail: Option<Phase>,
    pub cancel_during: Option<Phase>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedDetectors {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            inner: HeuristicDetectors::new(config),
            fail: None,
            cancel_during: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn script(&self, ctx: &AnalysisContext, phase: Phase) -> Result<()> {
        if self.cancel_during == Some(phase) {
            ctx.cancel();
            ctx.check()?;
        }
        if self.fail == Some(phase) {
            anyhow::bail!("scripted {} failure", phase);
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectDetectors for ScriptedDetectors {
    async fn detect_project_info(&self, ctx: &AnalysisContext, root: &Path) -> Result<ProjectInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script(ctx, Phase::ProjectInfo)?;
        self.inner.detect_project_info(ctx, root).await
    }

    async fn detect_languages(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<Vec<LanguageInfo>> {
        self.script(ctx, Phase::Languages)?;
        self.inner.detect_languages(ctx, root).await
    }

    async fn detect_frameworks(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<Vec<FrameworkInfo>> {
        self.script(ctx, Phase::Frameworks)?;
        self.inner.detect_frameworks(ctx, root).await
    }

    async fn analyze_dependencies(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        info: &ProjectInfo,
    ) -> Result<DependencyInfo> {
        self.script(ctx, Phase::Dependencies)?;
        self.inner.analyze_dependencies(ctx, root, info).await
    }
}

pub(crate) fn failed_phases(err: &AnalysisError) -> Vec<Phase> {
    match err {
        AnalysisError::Detection(failures) => failures.iter().map(|f| f.phase).collect(),
        _ => Vec::new(),
    }
}
