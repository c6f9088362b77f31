//! Pipeline layers. Each layer is independently failable and yields exactly
//! one `LayerResult` per run.

mod consistency;
mod fix;
mod rls;
mod schema;

use std::fmt;

use async_trait::async_trait;
use schemaguard_core::errors::LayerError;
use schemaguard_core::types::report::LayerResult;

use crate::context::LayerContext;

pub use consistency::ConsistencyLayer;
pub use fix::FixLayer;
pub use rls::RlsLayer;
pub use schema::SchemaLayer;

/// Data a layer needs from earlier in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// Produced by the schema layer.
    DatabaseMetadata,
    /// Produced by the code scan launched at run start.
    CodeScan,
    /// Produced by the consistency layer.
    Findings,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::DatabaseMetadata => "database metadata",
            Artifact::CodeScan => "code scan",
            Artifact::Findings => "consistency findings",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of the audit pipeline.
///
/// An `Err` is caught by the orchestrator and reported as a layer with
/// status `error`; later layers still run.
#[async_trait]
pub trait Layer: Send + Sync {
    /// Id used in options and reports.
    fn id(&self) -> &str;

    /// Artifacts that must exist before `run`; otherwise the layer is skipped.
    fn requires(&self) -> &[Artifact] {
        &[]
    }

    /// Connectors this layer owns besides the database scanner. A skipped
    /// layer reports each of them as skipped.
    fn connectors(&self) -> &[&'static str] {
        &[]
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError>;
}
