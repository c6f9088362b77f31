//! Code scanner errors.

use std::path::PathBuf;

use super::error_code::{self, GuardErrorCode};

/// Whole-scan failures. Individual files never produce these.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("source root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("source root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("code scan cancelled")]
    Cancelled,

    #[error("code scan task failed: {message}")]
    TaskFailed { message: String },
}

impl GuardErrorCode for ScanError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => error_code::CANCELLED,
            _ => error_code::SCAN_ERROR,
        }
    }
}

/// Per-file failures. Logged, counted, and otherwise ignored.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("grammar unavailable for {language}")]
    GrammarNotFound { language: String },

    #[error("tree-sitter failed on {path}: {message}")]
    TreeSitterError { path: PathBuf, message: String },
}

impl GuardErrorCode for ParseError {
    fn error_code(&self) -> &'static str {
        error_code::PARSE_ERROR
    }
}
