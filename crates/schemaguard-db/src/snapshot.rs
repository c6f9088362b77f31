//! Read-only provider serving a `DatabaseMetadata` JSON snapshot from disk.
//!
//! Used by the custom provider when no scanner is registered, and for
//! offline audits against a schema exported earlier.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use schemaguard_core::config::ConnectionConfig;
use schemaguard_core::errors::{ScannerError, ScannerResult};
use schemaguard_core::types::schema::{ColumnInfo, DatabaseMetadata, FunctionSignature, RlsState};

use crate::traits::DatabaseScanner;

pub struct SnapshotScanner {
    path: PathBuf,
    metadata: Option<DatabaseMetadata>,
}

impl SnapshotScanner {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            metadata: None,
        }
    }

    fn loaded(&self) -> ScannerResult<&DatabaseMetadata> {
        self.metadata.as_ref().ok_or(ScannerError::NotConnected)
    }
}

#[async_trait]
impl DatabaseScanner for SnapshotScanner {
    fn provider(&self) -> &str {
        "custom"
    }

    async fn connect(&mut self, _connection: &ConnectionConfig) -> ScannerResult<()> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScannerError::connection(format!("cannot read snapshot {}: {e}", self.path.display()))
        })?;
        let metadata: DatabaseMetadata = serde_json::from_str(&content).map_err(|e| {
            ScannerError::connection(format!("invalid snapshot {}: {e}", self.path.display()))
        })?;
        tracing::info!(path = %self.path.display(), tables = metadata.tables.len(), "snapshot loaded");
        self.metadata = Some(metadata);
        Ok(())
    }

    async fn scan_schema(&self) -> ScannerResult<DatabaseMetadata> {
        self.loaded().cloned()
    }

    async fn check_rls(&self, tables: &[String]) -> ScannerResult<BTreeMap<String, RlsState>> {
        let metadata = self.loaded()?;
        Ok(tables
            .iter()
            .filter_map(|t| metadata.rls.get(t).map(|s| (t.clone(), s.clone())))
            .collect())
    }

    async fn get_columns(&self, table: &str) -> ScannerResult<Vec<ColumnInfo>> {
        Ok(self.loaded()?.columns_of(table).to_vec())
    }

    async fn get_function_signature(&self, name: &str) -> ScannerResult<Option<FunctionSignature>> {
        Ok(self.loaded()?.function_signatures.get(name).cloned())
    }

    async fn execute_sql(&mut self, _sql: &str) -> ScannerResult<()> {
        Err(ScannerError::Unsupported {
            provider: "custom".into(),
            operation: "execute_sql on a snapshot".into(),
        })
    }

    async fn is_healthy(&self) -> bool {
        self.metadata.is_some()
    }

    async fn disconnect(&mut self) {
        self.metadata = None;
    }
}
