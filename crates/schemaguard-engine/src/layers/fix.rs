use async_trait::async_trait;
use schemaguard_analysis::generate_fixes;
use schemaguard_core::errors::LayerError;
use schemaguard_core::types::report::{LayerResult, LayerStatus};
use schemaguard_db::{ApplyPolicy, FixApplier};
use serde_json::json;

use super::{Artifact, Layer};
use crate::context::{LayerContext, FIX_APPLIER_CONNECTOR};

/// Generates fixes for every finding so far and, when `fix.apply` is set,
/// executes the authorized ones.
pub struct FixLayer;

#[async_trait]
impl Layer for FixLayer {
    fn id(&self) -> &str {
        "fix"
    }

    fn requires(&self) -> &[Artifact] {
        &[Artifact::DatabaseMetadata, Artifact::Findings]
    }

    fn connectors(&self) -> &[&'static str] {
        &[FIX_APPLIER_CONNECTOR]
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        let metadata = ctx.metadata.as_ref().ok_or_else(|| LayerError::MissingArtifact {
            artifact: Artifact::DatabaseMetadata.to_string(),
        })?;
        let fixes = generate_fixes(&ctx.findings, metadata);

        if !ctx.options.fix.apply {
            ctx.record_connector(
                FIX_APPLIER_CONNECTOR,
                LayerStatus::Skipped,
                Some("fix.apply is disabled".to_string()),
                None,
            );
            let result = LayerResult::new(self.id(), LayerStatus::Ok)
                .with_summary(format!("{} fixes suggested, none applied", fixes.len()))
                .with_payload(json!({ "fixes": fixes }))
                .with_metric("suggested", fixes.len() as f64);
            ctx.suggested_fixes = fixes;
            return Ok(result);
        }

        ctx.ensure_connected().await?;
        let started = std::time::Instant::now();
        let applier = FixApplier::new(ApplyPolicy::from(&ctx.options.fix));
        let outcome = applier.apply(ctx.scanner_mut(), &fixes).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = if outcome.failed_fixes > 0 {
            LayerStatus::Warn
        } else {
            LayerStatus::Ok
        };
        let summary = format!(
            "{} fixes suggested: {} applied, {} failed, {} skipped",
            fixes.len(),
            outcome.applied_fixes,
            outcome.failed_fixes,
            outcome.skipped_fixes
        );
        ctx.record_connector(FIX_APPLIER_CONNECTOR, status, Some(summary.clone()), Some(duration_ms));

        let result = LayerResult::new(self.id(), status)
            .with_summary(summary)
            .with_payload(json!({ "fixes": fixes, "result": outcome }))
            .with_metric("suggested", fixes.len() as f64)
            .with_metric("applied", outcome.applied_fixes as f64)
            .with_metric("failed", outcome.failed_fixes as f64)
            .with_metric("skipped", outcome.skipped_fixes as f64);

        ctx.suggested_fixes = fixes;
        ctx.fix_result = Some(outcome);
        Ok(result)
    }
}
