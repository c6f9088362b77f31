use async_trait::async_trait;
use schemaguard_core::errors::LayerError;
use schemaguard_core::types::report::{LayerResult, LayerStatus};
use serde_json::json;

use super::Layer;
use crate::context::LayerContext;

/// Connects the database scanner and snapshots the schema.
pub struct SchemaLayer;

#[async_trait]
impl Layer for SchemaLayer {
    fn id(&self) -> &str {
        "schema"
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        ctx.ensure_connected().await?;
        let metadata = ctx.scanner().scan_schema().await?;

        let summary = format!(
            "{} tables, {} functions, {} relations",
            metadata.tables.len(),
            metadata.functions.len(),
            metadata.relations.len()
        );
        let result = LayerResult::new(self.id(), LayerStatus::Ok)
            .with_summary(summary)
            .with_payload(json!({
                "schema": metadata.schema,
                "tables": metadata.tables,
                "functions": metadata.functions,
            }))
            .with_metric("tables", metadata.tables.len() as f64)
            .with_metric("functions", metadata.functions.len() as f64)
            .with_metric("relations", metadata.relations.len() as f64);

        ctx.metadata = Some(metadata);
        Ok(result)
    }
}
