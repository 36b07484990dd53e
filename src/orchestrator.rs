//! Drives the detectors for one project root.
//!
//! Project info, languages and frameworks run as independent tasks writing
//! disjoint fields of one shared result; any failure there is fatal. The
//! remaining phases run in a fixed order on the calling task, each consuming
//! earlier output, and their failures only mark the result as degraded. Only
//! clean results are cached.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::analysis::{
    build_code_context, build_issue_context, AnalysisResult, ConventionAnalyzer,
    HeuristicDetectors, IssueData, MetadataExtractor, PhaseErrorRecord, ProjectDetectors,
    ScanLimits, StructureAnalyzer,
};
use crate::cache::AnalysisCache;
use crate::config::AnalyzerConfig;
use crate::context::AnalysisContext;
use crate::error::{AnalysisError, Phase, PhaseFailure};

const CONCURRENT_PHASES: [Phase; 3] = [Phase::ProjectInfo, Phase::Languages, Phase::Frameworks];

/// Result of [`Analyzer::analyze_for_issue`].
#[derive(Debug)]
pub struct IssueAnalysis {
    pub result: AnalysisResult,
    /// Set when the project analysis succeeded but issue enrichment did not.
    pub enrichment_error: Option<AnalysisError>,
}

pub struct Analyzer<D: ProjectDetectors = HeuristicDetectors> {
    config: AnalyzerConfig,
    limits: ScanLimits,
    detectors: Arc<D>,
    cache: Option<Arc<AnalysisCache>>,
    structure: StructureAnalyzer,
    conventions: ConventionAnalyzer,
    metadata: MetadataExtractor,
}

impl Analyzer<HeuristicDetectors> {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let detectors = HeuristicDetectors::new(&config);
        Self::with_detectors(config, detectors)
    }
}

impl<D: ProjectDetectors> Analyzer<D> {
    /// Builds an analyzer whose cache (if enabled) is derived from `config`.
    pub fn with_detectors(config: AnalyzerConfig, detectors: D) -> Result<Self, AnalysisError> {
        config.check()?;
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(AnalysisCache::new(&config.cache)));
        Ok(Self::with_parts(config, detectors, cache))
    }

    /// Lets callers share one cache between analyzers.
    pub fn with_parts(
        config: AnalyzerConfig,
        detectors: D,
        cache: Option<Arc<AnalysisCache>>,
    ) -> Self {
        let limits = ScanLimits::from_config(&config);
        let cache = cache.filter(|_| config.cache.enabled);
        Self {
            structure: StructureAnalyzer::new(limits.clone()),
            conventions: ConventionAnalyzer::new(limits.clone()),
            metadata: MetadataExtractor::new(),
            config,
            limits,
            detectors: Arc::new(detectors),
            cache,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<AnalysisCache>> {
        self.cache.as_ref()
    }

    pub async fn analyze_project(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<AnalysisResult, AnalysisError> {
        if !root.exists() {
            return Err(AnalysisError::ProjectNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(AnalysisError::NotADirectory(root.to_path_buf()));
        }
        ctx.check()?;

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(root) {
                info!(root = %root.display(), "serving analysis from cache");
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let started_at = Utc::now();
        info!(root = %root.display(), "starting project analysis");

        let mut result = self.run_concurrent_stage(ctx, root).await?;
        result.started_at = started_at;

        let failures = self.run_sequential_stage(ctx, root, &mut result).await;

        result.degraded = !failures.is_empty();
        result.phase_errors = failures
            .iter()
            .map(|f| PhaseErrorRecord {
                phase: f.phase,
                message: format!("{:#}", f.error),
            })
            .collect();
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match (&self.cache, failures.is_empty()) {
            (Some(cache), true) => cache.set(root, &result),
            (Some(_), false) => {
                info!(
                    root = %root.display(),
                    failed_phases = failures.len(),
                    "analysis degraded, result not cached"
                );
            }
            (None, _) => {}
        }

        info!(
            root = %root.display(),
            elapsed_ms = result.duration_ms,
            degraded = result.degraded,
            "project analysis complete"
        );
        Ok(result)
    }

    /// Full project analysis plus an issue-specific enrichment step.
    ///
    /// An enrichment failure still returns the project result, with the error
    /// reported in [`IssueAnalysis::enrichment_error`].
    pub async fn analyze_for_issue(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        issue: &IssueData,
    ) -> Result<IssueAnalysis, AnalysisError> {
        let mut result = self.analyze_project(ctx, root).await?;

        let enrichment = ctx
            .check()
            .map_err(anyhow::Error::from)
            .and_then(|_| build_issue_context(ctx, root, &self.limits, issue));

        match enrichment {
            Ok(issue_context) => {
                result.issue_context = Some(issue_context);
                Ok(IssueAnalysis {
                    result,
                    enrichment_error: None,
                })
            }
            Err(e) => {
                warn!(root = %root.display(), error = %format!("{:#}", e), "issue enrichment failed");
                Ok(IssueAnalysis {
                    result,
                    enrichment_error: Some(AnalysisError::IssueEnrichment(e)),
                })
            }
        }
    }

    async fn run_concurrent_stage(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
    ) -> Result<AnalysisResult, AnalysisError> {
        let shared = Arc::new(Mutex::new(AnalysisResult::default()));
        let permits = Arc::new(Semaphore::new(self.config.max_workers));

        let handles: Vec<_> = CONCURRENT_PHASES
            .into_iter()
            .map(|phase| {
                let detectors = Arc::clone(&self.detectors);
                let shared = Arc::clone(&shared);
                let permits = Arc::clone(&permits);
                let ctx = ctx.clone();
                let root = root.to_path_buf();
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await?;
                    run_detector(phase, detectors.as_ref(), &ctx, &root, &shared).await
                });
                (phase, handle)
            })
            .collect();

        let mut failures = Vec::new();
        for (phase, handle) in handles {
            match handle.await {
                Ok(Ok(())) => debug!(phase = %phase, "detector finished"),
                Ok(Err(error)) => failures.push(PhaseFailure { phase, error }),
                Err(e) => failures.push(PhaseFailure {
                    phase,
                    error: anyhow::Error::new(e),
                }),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                warn!(phase = %failure.phase, error = %format!("{:#}", failure.error), "detector failed");
            }
            return Err(AnalysisError::Detection(failures));
        }

        let result = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };
        Ok(result)
    }

    /// Order matters: each step may read what the previous ones produced.
    async fn run_sequential_stage(
        &self,
        ctx: &AnalysisContext,
        root: &Path,
        result: &mut AnalysisResult,
    ) -> Vec<PhaseFailure> {
        let mut failures = Vec::new();

        let dependencies = self
            .detectors
            .analyze_dependencies(ctx, root, &result.project_info)
            .await;
        if let Some(dependencies) = absorb(&mut failures, Phase::Dependencies, dependencies) {
            result.dependencies = dependencies;
        }

        let structure = self.structure.analyze(ctx, root);
        if let Some(structure) = absorb(&mut failures, Phase::FileStructure, structure) {
            result.file_structure = structure;
        }

        let conventions = self.conventions.analyze(ctx, root, &result.languages);
        if let Some(conventions) = absorb(&mut failures, Phase::Conventions, conventions) {
            result.conventions = conventions;
        }

        let metadata = self.metadata.extract(ctx, root);
        if let Some(metadata) = absorb(&mut failures, Phase::Metadata, metadata) {
            result.metadata = metadata;
        }

        let code_context = ctx
            .check()
            .map_err(anyhow::Error::from)
            .map(|_| build_code_context(result));
        result.code_context = absorb(&mut failures, Phase::CodeContext, code_context);

        failures
    }
}

async fn run_detector<D: ProjectDetectors>(
    phase: Phase,
    detectors: &D,
    ctx: &AnalysisContext,
    root: &Path,
    shared: &Mutex<AnalysisResult>,
) -> anyhow::Result<()> {
    ctx.check()?;
    match phase {
        Phase::ProjectInfo => {
            let info = detectors.detect_project_info(ctx, root).await?;
            shared.lock().await.project_info = info;
        }
        Phase::Languages => {
            let languages = detectors.detect_languages(ctx, root).await?;
            shared.lock().await.languages = languages;
        }
        Phase::Frameworks => {
            let frameworks = detectors.detect_frameworks(ctx, root).await?;
            shared.lock().await.frameworks = frameworks;
        }
        other => anyhow::bail!("{} is not an independent detection phase", other),
    }
    Ok(())
}

fn absorb<T>(failures: &mut Vec<PhaseFailure>, phase: Phase, outcome: anyhow::Result<T>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(phase = %phase, error = %format!("{:#}", error), "analysis phase failed, continuing");
            failures.push(PhaseFailure { phase, error });
            None
        }
    }
}
