//! # schemaguard-engine
//!
//! The audit pipeline: an ordered list of [`Layer`]s sharing a
//! [`LayerContext`], driven by the [`Orchestrator`] into one `AuditReport`.

pub mod cancellation;
pub mod context;
pub mod layers;
pub mod orchestrator;
pub mod outcome;
pub mod registry;

pub use cancellation::AuditCancellation;
pub use context::LayerContext;
pub use layers::{Artifact, Layer};
pub use orchestrator::{Orchestrator, RunState};
pub use outcome::AuditOutcome;
pub use registry::LayerRegistry;

use schemaguard_core::config::AuditOptions;
use schemaguard_core::errors::AuditResult;

/// Run an audit with the built-in layers and the provider named in `options`.
pub async fn run_audit(options: AuditOptions) -> AuditResult<AuditOutcome> {
    Orchestrator::new(options).run().await
}
