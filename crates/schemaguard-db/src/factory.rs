//! Provider selection from the audit options.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use schemaguard_core::config::{AuditOptions, Provider};
use schemaguard_core::errors::ValidationError;

use crate::postgres::PostgresScanner;
use crate::snapshot::SnapshotScanner;
use crate::supabase::SupabaseScanner;
use crate::traits::DatabaseScanner;

/// `extra` key naming the snapshot file read by the custom provider.
pub const SNAPSHOT_PATH_KEY: &str = "snapshotPath";

/// Settings every provider is built with.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub timeout: Duration,
    pub schema: String,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ScannerSettings {
    pub fn from_options(options: &AuditOptions) -> Self {
        Self {
            timeout: Duration::from_millis(options.timeout_ms),
            schema: options.connection.schema.clone(),
            extra: options.extra.clone(),
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// Build the scanner for `options.provider`.
///
/// The custom provider needs either a caller-supplied scanner (handled by
/// the engine) or `extra.snapshotPath`.
pub fn create_scanner(options: &AuditOptions) -> Result<Box<dyn DatabaseScanner>, ValidationError> {
    let settings = ScannerSettings::from_options(options);
    let scanner: Box<dyn DatabaseScanner> = match options.provider {
        Provider::Postgres => Box::new(PostgresScanner::new(settings)),
        Provider::Supabase => Box::new(SupabaseScanner::new(settings)),
        Provider::Custom => {
            let path = settings.extra_str(SNAPSHOT_PATH_KEY).ok_or_else(|| {
                ValidationError::new(
                    "extra.snapshotPath",
                    "custom provider needs a registered scanner or a snapshot path",
                )
            })?;
            Box::new(SnapshotScanner::new(PathBuf::from(path)))
        }
    };
    tracing::debug!(provider = %options.provider, "database scanner created");
    Ok(scanner)
}
