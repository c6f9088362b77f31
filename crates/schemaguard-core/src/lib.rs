//! # schemaguard-core
//!
//! Foundation crate for the schemaguard audit engine.
//! Defines the shared value types, error taxonomy, configuration, and tracing setup.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod errors;
pub mod tracing;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{AuditOptions, FailOn, Provider};
pub use errors::error_code::GuardErrorCode;
pub use types::code::CodeScanResult;
pub use types::report::{AuditReport, LayerResult, ReportItem, Status};
pub use types::schema::DatabaseMetadata;
