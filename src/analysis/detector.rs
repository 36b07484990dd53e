use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use super::walker::ScanLimits;
use super::{
    DependencyAnalyzer, DependencyInfo, FrameworkDetector, FrameworkInfo, LanguageDetector,
    LanguageInfo, ProjectInfo, ProjectInfoDetector,
};
use crate::config::AnalyzerConfig;
use crate::context::AnalysisContext;

/// The heuristic detectors the orchestrator drives.
///
/// Implementations communicate only through return values and must honour
/// `ctx` at directory-entry granularity.
#[async_trait]
pub trait ProjectDetectors: Send + Sync + 'static {
    async fn detect_project_info(&self, ctx: &AnalysisContext, root: &Path) -> Result<ProjectInfo>;

    async fn detect_languages(&self, ctx: &AnalysisContext, root: &Path)
        -> Result<Vec<LanguageInfo>>;

    async fn detect_frameworks(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<Vec<FrameworkInfo>>;

    async fn analyze_dependencies(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        info: &ProjectInfo,
    ) -> Result<DependencyInfo>;
}

pub struct HeuristicDetectors {
    project: ProjectInfoDetector,
    languages: LanguageDetector,
    frameworks: FrameworkDetector,
    dependencies: DependencyAnalyzer,
}

impl HeuristicDetectors {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            project: ProjectInfoDetector::new(),
            languages: LanguageDetector::new(ScanLimits::from_config(config)),
            frameworks: FrameworkDetector::new(),
            dependencies: DependencyAnalyzer::new(),
        }
    }
}

#[async_trait]
impl ProjectDetectors for HeuristicDetectors {
    async fn detect_project_info(&self, ctx: &AnalysisContext, root: &Path) -> Result<ProjectInfo> {
        self.project.detect(ctx, root).await
    }

    async fn detect_languages(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<Vec<LanguageInfo>> {
        self.languages.detect(ctx, root).await
    }

    async fn detect_frameworks(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<Vec<FrameworkInfo>> {
        self.frameworks.detect(ctx, root).await
    }

    async fn analyze_dependencies(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        info: &ProjectInfo,
    ) -> Result<DependencyInfo> {
        self.dependencies.analyze(ctx, root, info).await
    }
}
