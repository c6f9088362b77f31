//! Executes suggested fixes over a connected scanner, one at a time.

use std::time::Instant;

use schemaguard_core::config::FixConfig;
use schemaguard_core::types::fix::{FixOutcome, FixResult, Severity, SkippedFix, SuggestedFix};

use crate::traits::DatabaseScanner;

/// What the caller authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyPolicy {
    /// Fixes above this severity are skipped.
    pub max_severity: Severity,
    /// Operator confirmed fixes that are not auto-apply.
    pub confirmed: bool,
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        Self {
            max_severity: Severity::Medium,
            confirmed: false,
        }
    }
}

impl From<&FixConfig> for ApplyPolicy {
    fn from(config: &FixConfig) -> Self {
        Self {
            max_severity: config.max_severity,
            confirmed: config.confirmed,
        }
    }
}

impl ApplyPolicy {
    /// Why `fix` must be skipped, or `None` if it may run.
    pub fn skip_reason(&self, fix: &SuggestedFix) -> Option<String> {
        if fix.severity > self.max_severity {
            return Some(format!(
                "severity {:?} exceeds authorized {:?}",
                fix.severity, self.max_severity
            ));
        }
        if !fix.auto_apply && !self.confirmed {
            return Some("requires confirmation".to_string());
        }
        None
    }
}

pub struct FixApplier {
    policy: ApplyPolicy,
}

impl FixApplier {
    pub fn new(policy: ApplyPolicy) -> Self {
        Self { policy }
    }

    /// Apply `fixes` in order. A failing fix is recorded and the batch continues.
    pub async fn apply(
        &self,
        scanner: &mut dyn DatabaseScanner,
        fixes: &[SuggestedFix],
    ) -> FixResult {
        let mut result = FixResult::default();

        for fix in fixes {
            if let Some(reason) = self.policy.skip_reason(fix) {
                tracing::debug!(fix_type = %fix.fix_type, reason = %reason, "fix skipped");
                result.skipped_fixes += 1;
                result.skipped.push(SkippedFix {
                    fix_type: fix.fix_type,
                    description: fix.description.clone(),
                    reason,
                });
                continue;
            }

            let start = Instant::now();
            let outcome = scanner.execute_sql(&fix.sql).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            let error = match outcome {
                Ok(()) => {
                    tracing::info!(fix_type = %fix.fix_type, target = ?fix.target(), duration_ms, "fix applied");
                    result.applied_fixes += 1;
                    None
                }
                Err(e) => {
                    tracing::warn!(fix_type = %fix.fix_type, target = ?fix.target(), error = %e, "fix failed");
                    result.failed_fixes += 1;
                    Some(e.to_string())
                }
            };
            result.details.push(FixOutcome {
                fix_type: fix.fix_type,
                description: fix.description.clone(),
                target: fix.target().map(str::to_string),
                success: error.is_none(),
                error,
            });
        }

        result
    }
}
