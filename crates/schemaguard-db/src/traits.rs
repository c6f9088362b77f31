//! The provider capability interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemaguard_core::config::ConnectionConfig;
use schemaguard_core::errors::ScannerResult;
use schemaguard_core::types::schema::{ColumnInfo, DatabaseMetadata, FunctionSignature, RlsState};

/// Connects to a database and extracts its structural metadata.
///
/// Implementations hold at most one connection. `execute_sql` takes
/// `&mut self` so statements on that connection are always serialized.
#[async_trait]
pub trait DatabaseScanner: Send + Sync {
    /// Provider id used in logs and connector results.
    fn provider(&self) -> &str;

    /// Fails with `ScannerError::Connection` on auth or network failure.
    async fn connect(&mut self, connection: &ConnectionConfig) -> ScannerResult<()>;

    /// All-or-nothing: any failed query yields `ScannerError::Introspection`
    /// and no partial snapshot.
    async fn scan_schema(&self) -> ScannerResult<DatabaseMetadata>;

    async fn check_rls(&self, tables: &[String]) -> ScannerResult<BTreeMap<String, RlsState>>;

    async fn get_columns(&self, table: &str) -> ScannerResult<Vec<ColumnInfo>>;

    /// `Ok(None)` when the function does not exist.
    async fn get_function_signature(&self, name: &str) -> ScannerResult<Option<FunctionSignature>>;

    /// Failures carry the database's error text verbatim.
    async fn execute_sql(&mut self, sql: &str) -> ScannerResult<()>;

    /// Never errors; an unreachable database is simply unhealthy.
    async fn is_healthy(&self) -> bool;

    /// Idempotent, and safe without a prior successful `connect`.
    async fn disconnect(&mut self);
}
