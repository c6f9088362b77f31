//! Cooperative cancellation for a whole audit run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use schemaguard_analysis::ScanCancellation;

/// Checked between layers. An in-flight layer always finishes; cancelling
/// also stops the code-scan walker early.
#[derive(Debug, Clone, Default)]
pub struct AuditCancellation {
    flag: Arc<AtomicBool>,
    scan: ScanCancellation,
}

impl AuditCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.scan.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Handle the code scanner polls.
    pub fn scan_handle(&self) -> ScanCancellation {
        self.scan.clone()
    }
}
