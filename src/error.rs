use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One detection step of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ProjectInfo,
    Languages,
    Frameworks,
    Dependencies,
    FileStructure,
    Conventions,
    Metadata,
    CodeContext,
    IssueContext,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProjectInfo => "project info",
            Self::Languages => "languages",
            Self::Frameworks => "frameworks",
            Self::Dependencies => "dependencies",
            Self::FileStructure => "file structure",
            Self::Conventions => "coding conventions",
            Self::Metadata => "project metadata",
            Self::CodeContext => "code context",
            Self::IssueContext => "issue context",
        };
        f.write_str(name)
    }
}

/// A failed phase together with the detector's error.
#[derive(Debug)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub error: anyhow::Error,
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.phase, self.error)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("project not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("project root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("analysis deadline exceeded")]
    DeadlineExceeded,

    #[error("detection failed in {} phase(s): {}", .0.len(), join_failures(.0))]
    Detection(Vec<PhaseFailure>),

    #[error("issue enrichment failed: {0:#}")]
    IssueEnrichment(anyhow::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// True when the error comes from the caller's context rather than the project.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            Self::Detection(failures) => failures.iter().any(|f| {
                matches!(
                    f.error.downcast_ref::<AnalysisError>(),
                    Some(AnalysisError::Cancelled | AnalysisError::DeadlineExceeded)
                )
            }),
            _ => false,
        }
    }
}

fn join_failures(failures: &[PhaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_error_lists_every_phase() {
        let err = AnalysisError::Detection(vec![
            PhaseFailure {
                phase: Phase::Languages,
                error: anyhow::anyhow!("walk failed"),
            },
            PhaseFailure {
                phase: Phase::Frameworks,
                error: anyhow::anyhow!("bad manifest"),
            },
        ]);

        let message = err.to_string();
        assert!(message.starts_with("detection failed in 2 phase(s)"));
        assert!(message.contains("languages: walk failed"));
        assert!(message.contains("frameworks: bad manifest"));
    }

    #[test]
    fn cancellation_is_recognised_through_detection_failures() {
        let err = AnalysisError::Detection(vec![PhaseFailure {
            phase: Phase::Languages,
            error: anyhow::Error::new(AnalysisError::Cancelled),
        }]);
        assert!(err.is_cancellation());
        assert!(!AnalysisError::ProjectNotFound(PathBuf::from("/nope")).is_cancellation());
    }
}
