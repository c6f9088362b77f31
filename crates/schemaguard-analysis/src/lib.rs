//! # schemaguard-analysis
//!
//! Pure analysis half of the audit engine: the source-tree code scanner,
//! the schema/code consistency analyzer, and the SQL fix generator.
//! Nothing in this crate touches the network.

pub mod consistency;
pub mod fixes;
pub mod scanner;

pub use consistency::{analyze, analyze_with};
pub use fixes::generate_fixes;
pub use scanner::{CodeScanner, ScanCancellation};
