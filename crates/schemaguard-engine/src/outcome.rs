use schemaguard_core::types::report::AuditReport;

/// A completed run: the full report plus the fail-on verdict for the host.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub report: AuditReport,
    /// The fail-on policy was tripped.
    pub failed: bool,
}

impl AuditOutcome {
    /// Process exit code for a CLI host.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed)
    }
}
