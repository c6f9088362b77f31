//! Error taxonomy for the audit engine.
//!
//! Provider and scanner errors are caught at the layer boundary and downgraded
//! to a layer status. Only [`AuditError`] aborts a run, and only before any
//! layer has started.

pub mod error_code;

mod audit_error;
mod layer_error;
mod scan_error;
mod scanner_error;
mod validation_error;

pub use audit_error::{AuditError, AuditResult};
pub use layer_error::LayerError;
pub use scan_error::{ParseError, ScanError};
pub use scanner_error::{ScannerError, ScannerResult};
pub use validation_error::ValidationError;
