use async_trait::async_trait;
use schemaguard_analysis::analyze_with;
use schemaguard_core::errors::LayerError;
use schemaguard_core::types::report::{CheckCategory, LayerResult};

use super::{Artifact, Layer};
use crate::context::LayerContext;

/// Diffs the code scan against the schema snapshot.
pub struct ConsistencyLayer;

#[async_trait]
impl Layer for ConsistencyLayer {
    fn id(&self) -> &str {
        "consistency"
    }

    fn requires(&self) -> &[Artifact] {
        &[Artifact::DatabaseMetadata, Artifact::CodeScan]
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        // RLS gaps belong to the rls layer whenever it has run or is still to run.
        let rls_reports_gaps =
            ctx.rls_states.is_some() || runs_later(&ctx.options.layers, self.id(), "rls");
        let checks: Vec<CheckCategory> = CheckCategory::ALL
            .into_iter()
            .filter(|c| !rls_reports_gaps || *c != CheckCategory::RlsGap)
            .collect();

        let code = ctx.code_scan().await?.clone();
        let metadata = ctx.metadata.as_ref().ok_or_else(|| LayerError::MissingArtifact {
            artifact: Artifact::DatabaseMetadata.to_string(),
        })?;
        let findings = analyze_with(metadata, &code, &checks);

        let items = findings.iter().map(|f| f.item.clone()).collect();
        let result = LayerResult::from_findings(self.id(), items)
            .with_summary(format!(
                "{} findings across {} referenced tables and {} functions",
                findings.len(),
                code.tables.len(),
                code.functions.len()
            ))
            .with_metric("files_scanned", code.files_scanned as f64)
            .with_metric("files_failed", code.files_failed as f64)
            .with_metric("tables_referenced", code.tables.len() as f64)
            .with_metric("functions_referenced", code.functions.len() as f64);

        ctx.findings.extend(findings);
        ctx.analyzed = true;
        Ok(result)
    }
}

fn runs_later(layers: &[String], current: &str, other: &str) -> bool {
    let position = |id: &str| layers.iter().position(|l| l == id);
    match (position(current), position(other)) {
        (Some(current), Some(other)) => other > current,
        (None, Some(_)) => true,
        _ => false,
    }
}
