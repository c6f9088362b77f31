//! Consistency analyzer: diffs what the code expects against the live schema.
//!
//! Pure and deterministic. Objects present in the database but never
//! referenced by code are not findings.

mod analyzer;
mod rpc_arguments;

pub use analyzer::{analyze, analyze_with};
pub use rpc_arguments::{compare_arguments, ArgumentDiff, CallMode};
