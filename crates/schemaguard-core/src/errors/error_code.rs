//! Stable error codes shared by every error type in the workspace.

pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
pub const INTROSPECTION_ERROR: &str = "INTROSPECTION_ERROR";
pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const SCAN_ERROR: &str = "SCAN_ERROR";
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
pub const LAYER_ERROR: &str = "LAYER_ERROR";
pub const MISSING_ARTIFACT: &str = "MISSING_ARTIFACT";
pub const SOURCE_ROOT_ERROR: &str = "SOURCE_ROOT_ERROR";
pub const CANCELLED: &str = "CANCELLED";

/// Maps an error onto a stable, machine-readable code.
pub trait GuardErrorCode {
    fn error_code(&self) -> &'static str;
}
