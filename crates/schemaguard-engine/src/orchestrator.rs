//! Runs the configured layers in order and aggregates the report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use schemaguard_core::config::AuditOptions;
use schemaguard_core::errors::{AuditError, AuditResult};
use schemaguard_core::types::report::{AuditReport, LayerResult, LayerStatus};
use schemaguard_core::GuardErrorCode;
use schemaguard_db::{create_scanner, DatabaseScanner};
use tracing::{debug, error, info, warn};

use crate::cancellation::AuditCancellation;
use crate::context::LayerContext;
use crate::layers::{Artifact, Layer};
use crate::outcome::AuditOutcome;
use crate::registry::LayerRegistry;

/// Where a run is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(String),
    Aggregated,
    /// Every configured layer produced a result, whatever its status.
    Completed,
    /// Options or source root were rejected before any layer ran.
    Aborted,
}

/// One audit run over a fixed set of options.
pub struct Orchestrator {
    options: AuditOptions,
    registry: LayerRegistry,
    scanner: Option<Box<dyn DatabaseScanner>>,
    cancellation: AuditCancellation,
    state: RunState,
}

impl Orchestrator {
    pub fn new(options: AuditOptions) -> Self {
        Self {
            options,
            registry: LayerRegistry::with_builtins(),
            scanner: None,
            cancellation: AuditCancellation::new(),
            state: RunState::Pending,
        }
    }

    /// Use `scanner` instead of building one from `options.provider`.
    pub fn with_scanner(mut self, scanner: Box<dyn DatabaseScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Register an extra layer, or replace a built-in with the same id.
    pub fn with_layer(mut self, layer: Arc<dyn Layer>) -> Self {
        self.registry.register(layer);
        self
    }

    /// Handle for cancelling the run from elsewhere.
    pub fn cancellation(&self) -> AuditCancellation {
        self.cancellation.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run every configured layer.
    ///
    /// Returns `Err` only when the run cannot start. Once the first layer
    /// runs, every failure is reported inside the `AuditReport`.
    pub async fn run(&mut self) -> AuditResult<AuditOutcome> {
        let (layers, mut ctx) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "audit aborted");
                self.state = RunState::Aborted;
                return Err(e);
            }
        };

        let run_start = Instant::now();
        if layers
            .iter()
            .any(|l| l.requires().contains(&Artifact::CodeScan))
        {
            ctx.start_code_scan();
        }

        let mut results = Vec::with_capacity(layers.len());
        for layer in &layers {
            let result = self.run_layer(layer.as_ref(), &mut ctx).await;
            results.push(result);
        }

        ctx.abandon_code_scan().await;
        let provider = ctx.scanner().provider().to_string();
        if !ctx.has_connector(&provider) {
            ctx.record_connector(
                &provider,
                LayerStatus::Skipped,
                Some("not invoked by any layer".to_string()),
                None,
            );
        }
        ctx.scanner_mut().disconnect().await;

        let report = AuditReport::assemble(
            ctx.project_ref.clone(),
            ctx.source_root.display().to_string(),
            ctx.connectors().to_vec(),
            results,
        );
        self.state = RunState::Aggregated;

        if let Some(path) = &self.options.output_path {
            write_report(path, &report).await;
        }

        let failed = report.should_fail(self.options.fail_on);
        info!(
            total = report.summary.total,
            errors = report.summary.errors,
            warnings = report.summary.warnings,
            failed,
            duration_ms = run_start.elapsed().as_millis() as u64,
            "audit complete"
        );
        self.state = RunState::Completed;
        Ok(AuditOutcome { report, failed })
    }

    fn prepare(&mut self) -> AuditResult<(Vec<Arc<dyn Layer>>, LayerContext)> {
        self.options.validate()?;
        let layers = self.registry.resolve(&self.options.layers)?;
        let source_root = resolve_source_root(self.options.source_root.as_deref())?;
        let scanner = match self.scanner.take() {
            Some(scanner) => scanner,
            None => create_scanner(&self.options)?,
        };
        debug!(
            root = %source_root.display(),
            provider = scanner.provider(),
            layers = ?self.options.layers,
            "audit prepared"
        );
        let ctx = LayerContext::new(
            self.options.clone(),
            source_root,
            scanner,
            self.cancellation.scan_handle(),
        );
        Ok((layers, ctx))
    }

    async fn run_layer(&mut self, layer: &dyn Layer, ctx: &mut LayerContext) -> LayerResult {
        let id = layer.id().to_string();

        let skip_reason = if self.cancellation.is_cancelled() {
            Some("audit cancelled".to_string())
        } else {
            layer
                .requires()
                .iter()
                .find(|a| !ctx.has(**a))
                .map(|missing| format!("{missing} unavailable"))
        };
        if let Some(reason) = skip_reason {
            info!(layer = %id, reason = %reason, "layer skipped");
            for connector in layer.connectors() {
                if !ctx.has_connector(connector) {
                    ctx.record_connector(
                        connector,
                        LayerStatus::Skipped,
                        Some(format!("{id} layer skipped: {reason}")),
                        None,
                    );
                }
            }
            return LayerResult::skipped(id, reason);
        }

        self.state = RunState::Running(id.clone());
        let start = Instant::now();
        let mut result = match layer.run(ctx).await {
            Ok(result) => result,
            Err(e) => {
                error!(layer = %id, error = %e, code = e.error_code(), "layer failed");
                LayerResult::failed(id.as_str(), e.to_string())
            }
        };
        result.id = id;
        info!(
            layer = %result.id,
            status = ?result.status,
            duration_ms = start.elapsed().as_millis() as u64,
            "layer finished"
        );
        result
    }
}

fn resolve_source_root(configured: Option<&Path>) -> AuditResult<PathBuf> {
    let path = match configured {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().map_err(|e| AuditError::SourceRoot {
            path: PathBuf::from("."),
            message: e.to_string(),
        })?,
    };
    let canonical = path.canonicalize().map_err(|e| AuditError::SourceRoot {
        path: path.clone(),
        message: e.to_string(),
    })?;
    if !canonical.is_dir() {
        return Err(AuditError::SourceRoot {
            path,
            message: "not a directory".to_string(),
        });
    }
    Ok(canonical)
}

async fn write_report(path: &Path, report: &AuditReport) {
    let json = match report.to_json_pretty() {
        Ok(json) => json,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot serialize report");
            return;
        }
    };
    match tokio::fs::write(path, json).await {
        Ok(()) => info!(path = %path.display(), "report written"),
        Err(e) => warn!(path = %path.display(), error = %e, "cannot write report"),
    }
}
