//! Layer pipeline against an in-memory database scanner.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemaguard_core::config::{AuditOptions, ConnectionConfig, FailOn, Provider};
use schemaguard_core::errors::{AuditError, LayerError, ScannerError, ScannerResult};
use schemaguard_core::types::fix::{FixType, Severity};
use schemaguard_core::types::report::{LayerResult, LayerStatus, ReportItem, Status};
use schemaguard_core::types::schema::{
    ColumnInfo, DatabaseMetadata, FunctionSignature, RlsState,
};
use schemaguard_engine::{
    Artifact, AuditCancellation, Layer, LayerContext, Orchestrator, RunState,
};

// ---- Helpers ----

/// In-memory scanner. Shares its call log so tests can inspect it after the
/// orchestrator has taken ownership.
#[derive(Clone, Default)]
struct MockScanner {
    metadata: DatabaseMetadata,
    rls: BTreeMap<String, RlsState>,
    connect_error: Option<ScannerError>,
    fail_sql_containing: Option<&'static str>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockScanner {
    fn with_tables(tables: &[&str]) -> Self {
        Self {
            metadata: DatabaseMetadata {
                schema: "public".into(),
                tables: tables.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl schemaguard_db::DatabaseScanner for MockScanner {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self, _connection: &ConnectionConfig) -> ScannerResult<()> {
        self.record("connect");
        match &self.connect_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn scan_schema(&self) -> ScannerResult<DatabaseMetadata> {
        self.record("scan_schema");
        Ok(self.metadata.clone())
    }

    async fn check_rls(&self, tables: &[String]) -> ScannerResult<BTreeMap<String, RlsState>> {
        self.record("check_rls");
        Ok(tables
            .iter()
            .filter_map(|t| self.rls.get(t).map(|s| (t.clone(), s.clone())))
            .collect())
    }

    async fn get_columns(&self, table: &str) -> ScannerResult<Vec<ColumnInfo>> {
        Ok(self.metadata.columns_of(table).to_vec())
    }

    async fn get_function_signature(&self, name: &str) -> ScannerResult<Option<FunctionSignature>> {
        Ok(self.metadata.function_signatures.get(name).cloned())
    }

    async fn execute_sql(&mut self, sql: &str) -> ScannerResult<()> {
        self.record(format!("execute: {sql}"));
        match self.fail_sql_containing {
            Some(marker) if sql.contains(marker) => Err(ScannerError::execution("permission denied")),
            _ => Ok(()),
        }
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn disconnect(&mut self) {
        self.record("disconnect");
    }
}

const APP_TS: &str = r#"export async function checkout(supabase: any, userId: string) {
  const { data } = await supabase.from('users').select('id');
  await supabase.from('orders').insert({ user_id: userId });
  return supabase.rpc('get_total', { user_id: userId });
}
"#;

fn source_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/checkout.ts"), APP_TS).unwrap();
    dir
}

fn options(root: &Path, layers: &[&str]) -> AuditOptions {
    AuditOptions {
        provider: Provider::Custom,
        source_root: Some(root.to_path_buf()),
        layers: layers.iter().map(|l| l.to_string()).collect(),
        ..Default::default()
    }
}

fn statuses(results: &[LayerResult]) -> Vec<(&str, LayerStatus)> {
    results.iter().map(|l| (l.id.as_str(), l.status)).collect()
}

// ---- Layer isolation ----

#[tokio::test]
async fn connection_failure_skips_dependent_layers() {
    let dir = source_tree();
    let scanner = MockScanner {
        connect_error: Some(ScannerError::connection("password authentication failed")),
        ..MockScanner::with_tables(&["users"])
    };
    let log = scanner.clone();

    let mut orchestrator = Orchestrator::new(options(dir.path(), &["schema", "rls", "consistency"]))
        .with_scanner(Box::new(scanner));
    let outcome = orchestrator.run().await.unwrap();
    let report = outcome.report;

    assert_eq!(
        statuses(&report.layers),
        vec![
            ("schema", LayerStatus::Error),
            ("rls", LayerStatus::Skipped),
            ("consistency", LayerStatus::Skipped),
        ]
    );
    assert!(report.layers[0]
        .summary
        .as_deref()
        .unwrap()
        .contains("password authentication failed"));
    assert!(report.layers[1]
        .summary
        .as_deref()
        .unwrap()
        .contains("database metadata"));
    assert_eq!(report.summary.total, 0);
    assert!(!outcome.failed);
    assert_eq!(orchestrator.state(), &RunState::Completed);

    let mock = report.connectors.iter().find(|c| c.id == "mock").unwrap();
    assert_eq!(mock.status, LayerStatus::Error);
    let code = report
        .connectors
        .iter()
        .find(|c| c.id == "code-scanner")
        .unwrap();
    assert_eq!(code.status, LayerStatus::Skipped);

    assert_eq!(log.calls(), vec!["connect", "disconnect"]);
}

// ---- End to end ----

#[tokio::test]
async fn missing_table_and_function_end_to_end() {
    let dir = source_tree();
    let mut orchestrator = Orchestrator::new(options(dir.path(), &["schema", "consistency"]))
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])));

    let outcome = orchestrator.run().await.unwrap();
    let report = &outcome.report;

    assert_eq!(
        statuses(&report.layers),
        vec![("schema", LayerStatus::Ok), ("consistency", LayerStatus::Error)]
    );
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.errors, 2);
    assert_eq!(report.summary.warnings, 0);

    let fixes: Vec<(FixType, &str)> = report
        .findings
        .iter()
        .map(|f| {
            let fix = f.suggested_fix.as_ref().unwrap();
            (fix.fix_type, fix.target.as_str())
        })
        .collect();
    assert_eq!(
        fixes,
        vec![
            (FixType::CreateTable, "orders"),
            (FixType::CreateFunction, "get_total"),
        ]
    );
    assert_eq!(
        report.findings[0].context_strings("locations"),
        vec!["src/checkout.ts:3"]
    );

    assert!(outcome.failed);
    assert_eq!(outcome.exit_code(), 1);

    let code = report
        .connectors
        .iter()
        .find(|c| c.id == "code-scanner")
        .unwrap();
    assert_eq!(code.status, LayerStatus::Ok);
    let metrics = report.layer("consistency").unwrap().metrics.as_ref().unwrap();
    assert_eq!(metrics["files_scanned"], 1.0);
}

#[tokio::test]
async fn fail_on_never_always_succeeds() {
    let dir = source_tree();
    let mut opts = options(dir.path(), &["schema", "consistency"]);
    opts.fail_on = FailOn::Never;
    let outcome = Orchestrator::new(opts)
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])))
        .run()
        .await
        .unwrap();
    assert_eq!(outcome.report.summary.errors, 2);
    assert!(!outcome.failed);
    assert_eq!(outcome.exit_code(), 0);
}

// ---- RLS ----

fn rls_scanner() -> MockScanner {
    let mut scanner = MockScanner::with_tables(&["users", "orders"]);
    scanner.rls.insert(
        "users".into(),
        RlsState {
            enabled: true,
            policies: vec![],
        },
    );
    scanner.rls.insert("orders".into(), RlsState::default());
    // Providers that introspect RLS during the schema scan expose it here too.
    scanner.metadata.rls = scanner.rls.clone();
    scanner
}

#[tokio::test]
async fn rls_gaps_are_reported_once() {
    let dir = source_tree();
    let mut orchestrator =
        Orchestrator::new(options(dir.path(), &["schema", "rls", "consistency"]))
            .with_scanner(Box::new(rls_scanner()));
    let report = orchestrator.run().await.unwrap().report;

    let rls = report.layer("rls").unwrap();
    assert_eq!(rls.status, LayerStatus::Warn);
    assert_eq!(rls.findings.as_ref().unwrap().len(), 2);

    let gap_messages = report
        .findings
        .iter()
        .filter(|f| f.message.contains("Row level security"))
        .count();
    assert_eq!(gap_messages, 2);

    // Only the missing function remains for the consistency layer.
    let consistency = report.layer("consistency").unwrap();
    assert_eq!(consistency.findings.as_ref().unwrap().len(), 1);
    assert_eq!(consistency.status, LayerStatus::Error);
}

#[tokio::test]
async fn rls_gaps_are_reported_once_when_rls_runs_last() {
    let dir = source_tree();
    let report = Orchestrator::new(options(dir.path(), &["schema", "consistency", "rls"]))
        .with_scanner(Box::new(rls_scanner()))
        .run()
        .await
        .unwrap()
        .report;

    let consistency = report.layer("consistency").unwrap();
    assert_eq!(consistency.findings.as_ref().unwrap().len(), 1);
    assert_eq!(report.layer("rls").unwrap().findings.as_ref().unwrap().len(), 2);
    assert_eq!(report.summary.warnings, 2);
    assert_eq!(report.summary.errors, 1);
}

#[tokio::test]
async fn protected_tables_are_reported_ok() {
    let dir = source_tree();
    let mut scanner = MockScanner::with_tables(&["users"]);
    scanner.rls.insert(
        "users".into(),
        RlsState {
            enabled: true,
            policies: vec![schemaguard_core::types::schema::TablePolicy {
                name: "own rows".into(),
                action: "ALL".into(),
                roles: vec![],
                using: Some("auth.uid() = id".into()),
                check: None,
            }],
        },
    );
    let report = Orchestrator::new(options(dir.path(), &["schema", "rls"]))
        .with_scanner(Box::new(scanner))
        .run()
        .await
        .unwrap()
        .report;

    let rls = report.layer("rls").unwrap();
    assert_eq!(rls.status, LayerStatus::Ok);
    assert_eq!(report.summary.ok, 1);
    assert!(report
        .connectors
        .iter()
        .all(|c| c.id != "code-scanner"));
}

// ---- Fixes ----

#[tokio::test]
async fn fix_layer_only_suggests_by_default() {
    let dir = source_tree();
    let scanner = rls_scanner();
    let log = scanner.clone();
    let report = Orchestrator::new(options(dir.path(), &["schema", "rls", "consistency", "fix"]))
        .with_scanner(Box::new(scanner))
        .run()
        .await
        .unwrap()
        .report;

    let fix = report.layer("fix").unwrap();
    assert_eq!(fix.status, LayerStatus::Ok);
    let suggested = fix.payload.as_ref().unwrap()["fixes"].as_array().unwrap();
    let types: Vec<&str> = suggested
        .iter()
        .map(|f| f["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec!["enable_rls", "add_rls_policy", "create_function"]
    );

    let applier = report
        .connectors
        .iter()
        .find(|c| c.id == "fix-applier")
        .unwrap();
    assert_eq!(applier.status, LayerStatus::Skipped);
    assert!(log.calls().iter().all(|c| !c.starts_with("execute")));
}

#[tokio::test]
async fn fix_layer_applies_authorized_fixes_and_isolates_failures() {
    let dir = source_tree();
    let scanner = MockScanner {
        fail_sql_containing: Some("CREATE POLICY"),
        ..rls_scanner()
    };
    let log = scanner.clone();
    let mut opts = options(dir.path(), &["schema", "rls", "consistency", "fix"]);
    opts.fix.apply = true;
    opts.fix.confirmed = true;
    opts.fix.max_severity = Severity::Medium;

    let report = Orchestrator::new(opts)
        .with_scanner(Box::new(scanner))
        .run()
        .await
        .unwrap()
        .report;

    let fix = report.layer("fix").unwrap();
    assert_eq!(fix.status, LayerStatus::Warn);
    let result = &fix.payload.as_ref().unwrap()["result"];
    assert_eq!(result["appliedFixes"], 1);
    assert_eq!(result["failedFixes"], 1);
    assert_eq!(result["skippedFixes"], 1);

    let executed: Vec<String> = log
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("execute"))
        .collect();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains("ENABLE ROW LEVEL SECURITY"));

    let applier = report
        .connectors
        .iter()
        .find(|c| c.id == "fix-applier")
        .unwrap();
    assert_eq!(applier.status, LayerStatus::Warn);
}

#[tokio::test]
async fn fix_layer_is_skipped_without_findings() {
    let dir = source_tree();
    let report = Orchestrator::new(options(dir.path(), &["schema", "fix"]))
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])))
        .run()
        .await
        .unwrap()
        .report;
    let fix = report.layer("fix").unwrap();
    assert_eq!(fix.status, LayerStatus::Skipped);
    assert!(fix.summary.as_deref().unwrap().contains("consistency findings"));

    let applier = report
        .connectors
        .iter()
        .find(|c| c.id == "fix-applier")
        .unwrap();
    assert_eq!(applier.status, LayerStatus::Skipped);
    assert!(applier
        .message
        .as_deref()
        .unwrap()
        .contains("consistency findings unavailable"));
}

// ---- Run-level failures ----

#[tokio::test]
async fn unknown_layer_aborts_before_running() {
    let dir = source_tree();
    let scanner = MockScanner::with_tables(&[]);
    let log = scanner.clone();
    let mut orchestrator = Orchestrator::new(options(dir.path(), &["schema", "telemetry"]))
        .with_scanner(Box::new(scanner));

    let err = orchestrator.run().await.unwrap_err();
    match err {
        AuditError::Validation(e) => {
            assert_eq!(e.field, "layers");
            assert!(e.message.contains("telemetry"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.state(), &RunState::Aborted);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn missing_source_root_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(options(&dir.path().join("gone"), &["schema"]))
        .with_scanner(Box::new(MockScanner::with_tables(&[])));
    assert!(matches!(
        orchestrator.run().await,
        Err(AuditError::SourceRoot { .. })
    ));
}

#[tokio::test]
async fn invalid_options_abort() {
    let dir = source_tree();
    let opts = AuditOptions {
        provider: Provider::Supabase,
        ..options(dir.path(), &["schema"])
    };
    let result = Orchestrator::new(opts)
        .with_scanner(Box::new(MockScanner::default()))
        .run()
        .await;
    assert!(matches!(result, Err(AuditError::Validation(_))));
}

// ---- Cancellation ----

#[tokio::test]
async fn cancelled_run_skips_every_layer() {
    let dir = source_tree();
    let mut orchestrator = Orchestrator::new(options(dir.path(), &["schema", "rls", "consistency"]))
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])));
    orchestrator.cancellation().cancel();

    let report = orchestrator.run().await.unwrap().report;
    assert!(report.layers.iter().all(|l| l.status == LayerStatus::Skipped));
    assert_eq!(
        report.layers[0].summary.as_deref(),
        Some("audit cancelled")
    );
    let mock = report.connectors.iter().find(|c| c.id == "mock").unwrap();
    assert_eq!(mock.status, LayerStatus::Skipped);
}

/// Cancels the run from inside the pipeline.
struct CancellingLayer(AuditCancellation);

#[async_trait]
impl Layer for CancellingLayer {
    fn id(&self) -> &str {
        "cancel"
    }

    async fn run(&self, _ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        self.0.cancel();
        Ok(LayerResult::new("cancel", LayerStatus::Ok))
    }
}

#[tokio::test]
async fn cancellation_between_layers_lets_the_current_one_finish() {
    let dir = source_tree();
    let orchestrator = Orchestrator::new(options(dir.path(), &["schema", "cancel", "rls"]))
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])));
    let handle = orchestrator.cancellation();
    let mut orchestrator = orchestrator.with_layer(Arc::new(CancellingLayer(handle)));

    let report = orchestrator.run().await.unwrap().report;
    assert_eq!(
        statuses(&report.layers),
        vec![
            ("schema", LayerStatus::Ok),
            ("cancel", LayerStatus::Ok),
            ("rls", LayerStatus::Skipped),
        ]
    );
}

// ---- Custom layers ----

/// Flags every table without a `_v2` twin.
struct NamingLayer;

#[async_trait]
impl Layer for NamingLayer {
    fn id(&self) -> &str {
        "naming"
    }

    fn requires(&self) -> &[Artifact] {
        &[Artifact::DatabaseMetadata]
    }

    async fn run(&self, ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        let metadata = ctx
            .metadata
            .as_ref()
            .ok_or_else(|| LayerError::Failed("no metadata".into()))?;
        let items = metadata
            .tables
            .iter()
            .map(|t| {
                if t.contains(char::is_uppercase) {
                    ReportItem::warn(format!("{t} is not snake_case"))
                } else {
                    ReportItem::ok(format!("{t} is snake_case"))
                }
            })
            .collect();
        Ok(LayerResult::from_findings(self.id(), items))
    }
}

/// Always errors.
struct BrokenLayer;

#[async_trait]
impl Layer for BrokenLayer {
    fn id(&self) -> &str {
        "broken"
    }

    async fn run(&self, _ctx: &mut LayerContext) -> Result<LayerResult, LayerError> {
        Err(LayerError::Failed("boom".into()))
    }
}

#[tokio::test]
async fn custom_layers_register_by_id() {
    let dir = source_tree();
    let outcome = Orchestrator::new(options(dir.path(), &["schema", "broken", "naming"]))
        .with_scanner(Box::new(MockScanner::with_tables(&["users", "UserEvents"])))
        .with_layer(Arc::new(NamingLayer))
        .with_layer(Arc::new(BrokenLayer))
        .run()
        .await
        .unwrap();
    let report = outcome.report;

    assert_eq!(
        statuses(&report.layers),
        vec![
            ("schema", LayerStatus::Ok),
            ("broken", LayerStatus::Error),
            ("naming", LayerStatus::Warn),
        ]
    );
    assert_eq!(report.layer("broken").unwrap().summary.as_deref(), Some("boom"));
    assert_eq!(report.summary.warnings, 1);
    assert_eq!(report.summary.ok, 1);
    assert!(report
        .findings
        .iter()
        .any(|f| f.status == Status::Warn && f.message.starts_with("UserEvents")));
}

// ---- Output ----

#[tokio::test]
async fn report_is_written_to_output_path() {
    let dir = source_tree();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("report.json");
    let mut opts = options(dir.path(), &["schema", "consistency"]);
    opts.output_path = Some(path.clone());
    opts.project_ref = Some("shop".into());

    let outcome = Orchestrator::new(opts)
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])))
        .run()
        .await
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["projectRef"], "shop");
    assert_eq!(written["summary"]["errors"], 2);
    assert_eq!(written["layers"].as_array().unwrap().len(), 2);
    assert_eq!(outcome.report.project_ref.as_deref(), Some("shop"));
}

#[tokio::test]
async fn unwritable_output_path_is_not_fatal() {
    let dir = source_tree();
    let mut opts = options(dir.path(), &["schema"]);
    opts.output_path = Some(dir.path().join("missing-dir/report.json"));

    let outcome = Orchestrator::new(opts)
        .with_scanner(Box::new(MockScanner::with_tables(&["users"])))
        .run()
        .await;
    assert!(outcome.is_ok());
}
