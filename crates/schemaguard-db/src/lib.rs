//! # schemaguard-db
//!
//! The database side of the audit: one capability trait, [`DatabaseScanner`],
//! with a provider per backend, plus the [`FixApplier`] that executes
//! suggested fixes over a scanner's connection.

pub mod applier;
pub mod factory;
pub mod postgres;
pub mod snapshot;
pub mod supabase;
pub mod timeout;
pub mod traits;

pub use applier::{ApplyPolicy, FixApplier};
pub use factory::{create_scanner, ScannerSettings};
pub use traits::DatabaseScanner;
