//! Fix generator: findings → idempotent SQL remediations.

mod generator;
pub mod sql;

pub use generator::{generate_fix, generate_fixes};
