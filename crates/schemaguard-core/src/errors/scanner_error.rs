//! Database scanner errors.

use super::error_code::{self, GuardErrorCode};

/// Errors raised by a `DatabaseScanner` provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScannerError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("schema introspection failed: {message}")]
    Introspection { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Carries the database's error text verbatim.
    #[error("{message}")]
    Execution { message: String },

    #[error("scanner is not connected")]
    NotConnected,

    #[error("{provider} provider does not support {operation}")]
    Unsupported { provider: String, operation: String },
}

impl ScannerError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn introspection(message: impl Into<String>) -> Self {
        Self::Introspection {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Only timeouts are worth retrying; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl GuardErrorCode for ScannerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => error_code::CONNECTION_ERROR,
            Self::Introspection { .. } => error_code::INTROSPECTION_ERROR,
            Self::Timeout { .. } => error_code::TIMEOUT_ERROR,
            Self::Execution { .. } => error_code::EXECUTION_ERROR,
            Self::NotConnected => error_code::NOT_CONNECTED,
            Self::Unsupported { .. } => error_code::UNSUPPORTED_OPERATION,
        }
    }
}

/// Convenience type alias.
pub type ScannerResult<T> = Result<T, ScannerError>;
