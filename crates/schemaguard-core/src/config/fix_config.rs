use serde::{Deserialize, Serialize};

use crate::types::fix::Severity;

/// Controls what the fix layer is allowed to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Execute fixes. When false the fix layer only generates them.
    pub apply: bool,
    /// Highest severity the applier may execute.
    #[serde(alias = "maxSeverity")]
    pub max_severity: Severity,
    /// Operator confirmed non-auto-apply fixes up front.
    pub confirmed: bool,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            apply: false,
            max_severity: Severity::Medium,
            confirmed: false,
        }
    }
}
