//! Suggested remediations and their execution outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    CreateTable,
    AddColumn,
    CreateFunction,
    EnableRls,
    AddRlsPolicy,
    AddForeignKey,
    CreateIndex,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::CreateTable => "create_table",
            FixType::AddColumn => "add_column",
            FixType::CreateFunction => "create_function",
            FixType::EnableRls => "enable_rls",
            FixType::AddRlsPolicy => "add_rls_policy",
            FixType::AddForeignKey => "add_foreign_key",
            FixType::CreateIndex => "create_index",
        }
    }

    /// Reversible, additive operations that may run without confirmation.
    pub fn is_auto_applicable(&self) -> bool {
        matches!(self, FixType::CreateIndex | FixType::EnableRls)
    }
}

impl fmt::Display for FixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A proposed remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedFix {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub description: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub severity: Severity,
    pub auto_apply: bool,
}

impl SuggestedFix {
    /// Table or function the fix targets.
    pub fn target(&self) -> Option<&str> {
        self.table.as_deref().or(self.function.as_deref())
    }
}

/// Outcome of one attempted fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A fix that was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFix {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub description: String,
    pub reason: String,
}

/// Aggregate outcome of applying a batch of fixes.
///
/// `details` has one entry per attempted fix and `skipped` one per skipped fix.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResult {
    pub applied_fixes: usize,
    pub failed_fixes: usize,
    pub skipped_fixes: usize,
    pub details: Vec<FixOutcome>,
    #[serde(default)]
    pub skipped: Vec<SkippedFix>,
}

impl FixResult {
    pub fn total(&self) -> usize {
        self.applied_fixes + self.failed_fixes + self.skipped_fixes
    }
}
