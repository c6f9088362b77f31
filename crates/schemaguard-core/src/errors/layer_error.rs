//! Errors returned by a pipeline layer.

use super::error_code::{self, GuardErrorCode};
use super::{ScanError, ScannerError};

/// A layer failure. The orchestrator converts it into a `LayerResult`
/// with status `error` and the message as summary.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error(transparent)]
    Scanner(#[from] ScannerError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("required artifact unavailable: {artifact}")]
    MissingArtifact { artifact: String },

    #[error("{0}")]
    Failed(String),
}

impl GuardErrorCode for LayerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Scanner(e) => e.error_code(),
            Self::Scan(e) => e.error_code(),
            Self::MissingArtifact { .. } => error_code::MISSING_ARTIFACT,
            Self::Failed(_) => error_code::LAYER_ERROR,
        }
    }
}
