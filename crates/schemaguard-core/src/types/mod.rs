//! Shared value objects. No behavior beyond construction and folding.

pub mod code;
pub mod fix;
pub mod report;
pub mod schema;
