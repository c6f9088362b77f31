//! Provider selection and the offline snapshot provider.

use std::path::Path;

use schemaguard_core::config::{AuditOptions, ConnectionConfig, Provider};
use schemaguard_core::errors::ScannerError;
use schemaguard_core::types::schema::{DatabaseMetadata, RlsState};
use schemaguard_db::factory::SNAPSHOT_PATH_KEY;
use schemaguard_db::snapshot::SnapshotScanner;
use schemaguard_db::{create_scanner, DatabaseScanner};

fn write_snapshot(dir: &Path) -> std::path::PathBuf {
    let mut metadata = DatabaseMetadata {
        schema: "public".into(),
        tables: ["users".to_string(), "orders".to_string()].into(),
        ..Default::default()
    };
    metadata.rls.insert(
        "users".into(),
        RlsState {
            enabled: true,
            policies: vec![],
        },
    );
    let path = dir.join("schema.json");
    std::fs::write(&path, serde_json::to_string(&metadata).unwrap()).unwrap();
    path
}

// ---- Factory ----

#[test]
fn provider_enum_selects_scanner() {
    let mut options = AuditOptions {
        provider: Provider::Postgres,
        ..Default::default()
    };
    options.connection.url = Some("postgres://localhost/app".into());
    assert_eq!(create_scanner(&options).unwrap().provider(), "postgres");

    options.provider = Provider::Supabase;
    assert_eq!(create_scanner(&options).unwrap().provider(), "supabase");
}

#[test]
fn custom_provider_needs_a_snapshot_path() {
    let mut options = AuditOptions {
        provider: Provider::Custom,
        ..Default::default()
    };
    let err = create_scanner(&options).err().unwrap();
    assert_eq!(err.field, "extra.snapshotPath");

    options
        .extra
        .insert(SNAPSHOT_PATH_KEY.into(), serde_json::json!("schema.json"));
    assert_eq!(create_scanner(&options).unwrap().provider(), "custom");
}

// ---- Snapshot provider ----

#[tokio::test]
async fn snapshot_serves_metadata_after_connect() {
    let dir = tempfile::tempdir().unwrap();
    let mut scanner = SnapshotScanner::new(write_snapshot(dir.path()));

    assert_eq!(scanner.scan_schema().await, Err(ScannerError::NotConnected));
    assert!(!scanner.is_healthy().await);

    scanner.connect(&ConnectionConfig::default()).await.unwrap();
    assert!(scanner.is_healthy().await);

    let metadata = scanner.scan_schema().await.unwrap();
    assert!(metadata.has_table("orders"));

    let rls = scanner
        .check_rls(&["users".to_string(), "orders".to_string()])
        .await
        .unwrap();
    assert_eq!(rls.len(), 1);
    assert!(rls["users"].enabled);

    assert!(scanner.get_columns("users").await.unwrap().is_empty());
    assert_eq!(scanner.get_function_signature("nope").await.unwrap(), None);
}

#[tokio::test]
async fn snapshot_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut scanner = SnapshotScanner::new(write_snapshot(dir.path()));
    scanner.connect(&ConnectionConfig::default()).await.unwrap();
    let err = scanner.execute_sql("DROP TABLE users").await.unwrap_err();
    assert!(matches!(err, ScannerError::Unsupported { .. }));
}

#[tokio::test]
async fn unreadable_snapshot_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut scanner = SnapshotScanner::new(dir.path().join("missing.json"));
    let err = scanner
        .connect(&ConnectionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScannerError::Connection { .. }));

    std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
    let mut scanner = SnapshotScanner::new(dir.path().join("bad.json"));
    assert!(matches!(
        scanner.connect(&ConnectionConfig::default()).await,
        Err(ScannerError::Connection { .. })
    ));
}

#[tokio::test]
async fn disconnect_is_idempotent_before_connect() {
    let dir = tempfile::tempdir().unwrap();
    let mut scanner = SnapshotScanner::new(write_snapshot(dir.path()));
    scanner.disconnect().await;
    scanner.disconnect().await;

    let mut options = AuditOptions::default();
    options.connection.url = Some("https://example.supabase.co".into());
    options.connection.key = Some("anon".into());
    let mut supabase = create_scanner(&options).unwrap();
    supabase.disconnect().await;
    assert!(!supabase.is_healthy().await);
    assert_eq!(
        supabase.execute_sql("SELECT 1").await,
        Err(ScannerError::NotConnected)
    );
}
