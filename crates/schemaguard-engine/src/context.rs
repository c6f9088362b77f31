//! State shared by the layers of one run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use schemaguard_analysis::{CodeScanner, ScanCancellation};
use schemaguard_core::config::AuditOptions;
use schemaguard_core::errors::{LayerError, ScanError, ScannerError};
use schemaguard_core::types::code::CodeScanResult;
use schemaguard_core::types::fix::{FixResult, SuggestedFix};
use schemaguard_core::types::report::{ConnectorResult, Finding, LayerStatus};
use schemaguard_core::types::schema::{DatabaseMetadata, RlsState};
use schemaguard_db::DatabaseScanner;
use tokio::task::JoinHandle;

use crate::layers::Artifact;

/// Connector id of the source-tree scanner.
pub const CODE_SCANNER_CONNECTOR: &str = "code-scanner";

/// Connector id of the fix applier.
pub const FIX_APPLIER_CONNECTOR: &str = "fix-applier";

enum CodeScanSlot {
    NotStarted,
    Pending {
        handle: JoinHandle<Result<CodeScanResult, ScanError>>,
        started: Instant,
    },
    Ready(CodeScanResult),
    Failed(String),
}

/// Everything a layer may read or produce.
///
/// Artifacts are filled in by the layers that produce them; a layer that
/// needs one declares it through [`Layer::requires`](crate::layers::Layer::requires).
pub struct LayerContext {
    pub options: AuditOptions,
    pub source_root: PathBuf,
    pub project_ref: Option<String>,
    pub metadata: Option<DatabaseMetadata>,
    /// Set once the rls layer has introspected RLS state.
    pub rls_states: Option<BTreeMap<String, RlsState>>,
    /// Typed findings from every layer so far, in report order.
    pub findings: Vec<Finding>,
    /// The consistency analysis has run.
    pub analyzed: bool,
    pub suggested_fixes: Vec<SuggestedFix>,
    pub fix_result: Option<FixResult>,
    pub(crate) scanner: Box<dyn DatabaseScanner>,
    pub(crate) connected: bool,
    connectors: Vec<ConnectorResult>,
    code_scan: CodeScanSlot,
    scan_cancellation: ScanCancellation,
}

impl LayerContext {
    pub fn new(
        options: AuditOptions,
        source_root: PathBuf,
        scanner: Box<dyn DatabaseScanner>,
        scan_cancellation: ScanCancellation,
    ) -> Self {
        Self {
            project_ref: options.project_ref.clone(),
            options,
            source_root,
            metadata: None,
            rls_states: None,
            findings: Vec::new(),
            analyzed: false,
            suggested_fixes: Vec::new(),
            fix_result: None,
            scanner,
            connected: false,
            connectors: Vec::new(),
            code_scan: CodeScanSlot::NotStarted,
            scan_cancellation,
        }
    }

    pub fn has(&self, artifact: Artifact) -> bool {
        match artifact {
            Artifact::DatabaseMetadata => self.metadata.is_some(),
            Artifact::CodeScan => matches!(
                self.code_scan,
                CodeScanSlot::Pending { .. } | CodeScanSlot::Ready(_)
            ),
            Artifact::Findings => self.analyzed,
        }
    }

    pub fn scanner_mut(&mut self) -> &mut dyn DatabaseScanner {
        self.scanner.as_mut()
    }

    pub fn scanner(&self) -> &dyn DatabaseScanner {
        self.scanner.as_ref()
    }

    /// Connect the database scanner once per run, recording its connector result.
    pub async fn ensure_connected(&mut self) -> Result<(), ScannerError> {
        if self.connected {
            return Ok(());
        }
        let start = Instant::now();
        let result = self.scanner.connect(&self.options.connection).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let provider = self.scanner.provider().to_string();
        match &result {
            Ok(()) => {
                self.connected = true;
                self.record_connector(&provider, LayerStatus::Ok, None, Some(duration_ms));
            }
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "database connection failed");
                self.record_connector(
                    &provider,
                    LayerStatus::Error,
                    Some(e.to_string()),
                    Some(duration_ms),
                );
            }
        }
        result
    }

    /// Record a connector outcome. The latest outcome per id wins.
    pub fn record_connector(
        &mut self,
        id: &str,
        status: LayerStatus,
        message: Option<String>,
        duration_ms: Option<u64>,
    ) {
        self.connectors.retain(|c| c.id != id);
        self.connectors.push(ConnectorResult {
            id: id.to_string(),
            status,
            message,
            duration_ms,
        });
    }

    pub fn connectors(&self) -> &[ConnectorResult] {
        &self.connectors
    }

    pub(crate) fn has_connector(&self, id: &str) -> bool {
        self.connectors.iter().any(|c| c.id == id)
    }

    /// Launch the code scan on the blocking pool; it runs while other layers do.
    pub(crate) fn start_code_scan(&mut self) {
        if !matches!(self.code_scan, CodeScanSlot::NotStarted) {
            return;
        }
        let scanner = CodeScanner::with_cancellation(
            self.options.scan.clone(),
            self.scan_cancellation.clone(),
        );
        let root = self.source_root.clone();
        let handle = tokio::task::spawn_blocking(move || scanner.scan(&root));
        self.code_scan = CodeScanSlot::Pending {
            handle,
            started: Instant::now(),
        };
    }

    /// Wait for the code scan started at run start.
    pub async fn code_scan(&mut self) -> Result<&CodeScanResult, LayerError> {
        let slot = std::mem::replace(&mut self.code_scan, CodeScanSlot::NotStarted);
        let mut fresh_error = None;
        self.code_scan = match slot {
            CodeScanSlot::Pending { handle, started } => {
                let outcome = handle.await.unwrap_or_else(|e| {
                    Err(ScanError::TaskFailed {
                        message: e.to_string(),
                    })
                });
                let duration_ms = Some(started.elapsed().as_millis() as u64);
                match outcome {
                    Ok(result) => {
                        let message = format!(
                            "{} files scanned, {} failed",
                            result.files_scanned, result.files_failed
                        );
                        self.record_connector(
                            CODE_SCANNER_CONNECTOR,
                            LayerStatus::Ok,
                            Some(message),
                            duration_ms,
                        );
                        CodeScanSlot::Ready(result)
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.record_connector(
                            CODE_SCANNER_CONNECTOR,
                            LayerStatus::Error,
                            Some(message.clone()),
                            duration_ms,
                        );
                        fresh_error = Some(e);
                        CodeScanSlot::Failed(message)
                    }
                }
            }
            other => other,
        };

        if let Some(e) = fresh_error {
            return Err(LayerError::Scan(e));
        }
        match &self.code_scan {
            CodeScanSlot::Ready(result) => Ok(result),
            CodeScanSlot::Failed(message) => Err(LayerError::Failed(message.clone())),
            _ => Err(LayerError::MissingArtifact {
                artifact: Artifact::CodeScan.to_string(),
            }),
        }
    }

    /// Stop a scan nobody consumed and record it as skipped.
    pub(crate) async fn abandon_code_scan(&mut self) {
        if let CodeScanSlot::Pending { handle, .. } =
            std::mem::replace(&mut self.code_scan, CodeScanSlot::NotStarted)
        {
            self.scan_cancellation.cancel();
            let _ = handle.await;
            self.record_connector(
                CODE_SCANNER_CONNECTOR,
                LayerStatus::Skipped,
                Some("no layer consumed the code scan".to_string()),
                None,
            );
        }
    }
}
