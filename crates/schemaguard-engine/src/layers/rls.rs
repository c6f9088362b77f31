use async_trait::async_trait;
use schemaguard_analysis::analyze_with;
use schemaguard_core::errors::LayerError;
use schemaguard_core::types::code::CodeScanResult;
use schemaguard_core::types::report::{CheckCategory, LayerResult, ReportItem};

use super::{Artifact, Layer};
use crate::context::LayerContext;

/// Introspects row-level security for every table in the snapshot.
///
/// Reports `ok` per protected table and `warn` per gap. The gaps join the
/// run's typed findings so the fix layer can remediate them.
pub struct RlsLayer;

#[async_trait]
impl Layer for RlsLayer {
    fn id(&self) -> &str {
        "rls"
    }

    fn requires(&self) -> &[Artifact] {
        &[Artifact::DatabaseMetadata]
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        let metadata = ctx.metadata.as_ref().ok_or_else(|| LayerError::MissingArtifact {
            artifact: Artifact::DatabaseMetadata.to_string(),
        })?;
        let tables: Vec<String> = metadata.tables.iter().cloned().collect();
        let states = ctx.scanner().check_rls(&tables).await?;

        let merged = metadata.with_rls(&states);
        let mut gaps = analyze_with(&merged, &CodeScanResult::default(), &[CheckCategory::RlsGap]);

        let mut items = Vec::with_capacity(states.len());
        for (table, state) in &states {
            match gaps.iter().find(|g| &g.subject == table) {
                Some(gap) => items.push(gap.item.clone()),
                None => items.push(
                    ReportItem::ok(format!(
                        "Row level security is enabled on \"{table}\" with {} policies",
                        state.policies.len()
                    ))
                    .with_context("table", table.as_str()),
                ),
            }
        }

        let summary = format!("{} tables checked, {} gaps", states.len(), gaps.len());
        ctx.metadata = Some(merged);
        ctx.rls_states = Some(states);
        ctx.findings.append(&mut gaps);

        Ok(LayerResult::from_findings(self.id(), items).with_summary(summary))
    }
}
