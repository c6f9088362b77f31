//! Bounds every network operation by the configured timeout.

use std::future::Future;
use std::time::Duration;

use schemaguard_core::errors::{ScannerError, ScannerResult};

/// Await `fut`, failing with `ScannerError::Timeout` once `timeout` elapses.
pub async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> ScannerResult<T>
where
    F: Future<Output = ScannerResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "operation timed out");
            Err(ScannerError::Timeout {
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}
