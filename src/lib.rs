pub mod analysis;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use analysis::{AnalysisResult, IssueData, ProjectDetectors};
pub use cache::AnalysisCache;
pub use config::{AnalyzerConfig, CacheConfig, CacheNamespace};
pub use context::AnalysisContext;
pub use error::{AnalysisError, Phase};
pub use orchestrator::{Analyzer, IssueAnalysis};
