use std::path::PathBuf;

use camera_ingest::CaptureError;
use rebar_core::ContractViolation;
use thiserror::Error;

/// Failure inside one pipeline run.
#[derive(Debug, Error)]
pub(crate) enum AnalysisError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
    #[error("segment detection failed: {0}")]
    Detection(#[source] anyhow::Error),
    #[error("detector output rejected: {0}")]
    Contract(#[from] ContractViolation),
    #[error("failed to render annotated frame: {0}")]
    Render(#[source] anyhow::Error),
}

/// Reasons a capture trigger did not produce a new result.
#[derive(Debug, Error)]
pub(crate) enum TriggerError {
    #[error("capture already in progress")]
    CaptureAlreadyInProgress,
    #[error("capture failed: {0}")]
    CaptureFailed(#[source] CaptureError),
    #[error("analysis failed: {0}")]
    AnalysisFailed(#[source] AnalysisError),
}

impl TriggerError {
    /// Metric/log label for the failure kind.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TriggerError::CaptureAlreadyInProgress => "already_in_progress",
            TriggerError::CaptureFailed(_) => "capture_failed",
            TriggerError::AnalysisFailed(_) => "analysis_failed",
        }
    }
}

/// Artifact store failure. Reported to the caller but never rolls back the
/// in-memory result.
#[derive(Debug, Error)]
pub(crate) enum PersistError {
    #[error("persistence failed writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("persistence failed encoding {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("persistence failed serialising record: {0}")]
    Serialize(#[from] serde_json::Error),
}
