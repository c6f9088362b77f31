use std::path::PathBuf;

use super::error_code::{self, GuardErrorCode};
use super::ValidationError;

/// Run-level failures. When one of these is returned no layer has run and
/// no report exists.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cannot resolve source root {path}: {message}")]
    SourceRoot { path: PathBuf, message: String },
}

impl GuardErrorCode for AuditError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::SourceRoot { .. } => error_code::SOURCE_ROOT_ERROR,
        }
    }
}

/// Convenience type alias.
pub type AuditResult<T> = Result<T, AuditError>;
