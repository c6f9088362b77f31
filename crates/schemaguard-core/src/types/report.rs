//! Findings, layer results, and the final audit report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fix::FixType;
use crate::config::FailOn;

/// Status of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warn,
    Error,
}

/// Points a finding at the fix that would remediate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReference {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub target: String,
}

/// One mismatch or confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<FixReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, serde_json::Value>>,
}

impl ReportItem {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
            suggested_fix: None,
            context: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Status::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_fix(mut self, fix_type: FixType, target: impl Into<String>) -> Self {
        self.suggested_fix = Some(FixReference {
            fix_type,
            target: target.into(),
        });
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// String array stored under `key` in the context, or empty.
    pub fn context_strings(&self, key: &str) -> Vec<String> {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.get(key))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.as_ref()?.get(key)?.as_str()
    }
}

/// Analyzer check categories, declared in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    MissingTable,
    MissingFunction,
    BrokenRelation,
    RpcArgumentMismatch,
    RlsGap,
    MissingColumn,
    UnindexedForeignKey,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 7] = [
        CheckCategory::MissingTable,
        CheckCategory::MissingFunction,
        CheckCategory::BrokenRelation,
        CheckCategory::RpcArgumentMismatch,
        CheckCategory::RlsGap,
        CheckCategory::MissingColumn,
        CheckCategory::UnindexedForeignKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::MissingTable => "missing_table",
            CheckCategory::MissingFunction => "missing_function",
            CheckCategory::BrokenRelation => "broken_relation",
            CheckCategory::RpcArgumentMismatch => "rpc_argument_mismatch",
            CheckCategory::RlsGap => "rls_gap",
            CheckCategory::MissingColumn => "missing_column",
            CheckCategory::UnindexedForeignKey => "unindexed_foreign_key",
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed analyzer finding: the report item plus what produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: CheckCategory,
    /// Identifier the finding is about (table, function, `table.column`, constraint).
    pub subject: String,
    pub item: ReportItem,
}

/// Status of a pipeline layer or connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Ok,
    Warn,
    Error,
    Skipped,
}

impl From<Status> for LayerStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => LayerStatus::Ok,
            Status::Warn => LayerStatus::Warn,
            Status::Error => LayerStatus::Error,
        }
    }
}

/// Outcome of one pipeline layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerResult {
    pub id: String,
    pub status: LayerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<ReportItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl LayerResult {
    pub fn new(id: impl Into<String>, status: LayerStatus) -> Self {
        Self {
            id: id.into(),
            status,
            summary: None,
            findings: None,
            payload: None,
            metrics: None,
        }
    }

    pub fn skipped(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(id, LayerStatus::Skipped).with_summary(reason)
    }

    pub fn failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, LayerStatus::Error).with_summary(message)
    }

    /// Status follows the worst finding; `Ok` when there are none.
    pub fn from_findings(id: impl Into<String>, findings: Vec<ReportItem>) -> Self {
        let status = findings
            .iter()
            .map(|f| f.status)
            .max()
            .map(LayerStatus::from)
            .unwrap_or(LayerStatus::Ok);
        Self {
            findings: Some(findings),
            ..Self::new(id, status)
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.metrics
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
        self
    }
}

/// Outcome of one scanner or provider the run invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorResult {
    pub id: String,
    pub status: LayerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Exact tallies of findings by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub ok: usize,
}

impl Summary {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a ReportItem>) -> Self {
        findings.into_iter().fold(Summary::default(), |mut acc, f| {
            acc.total += 1;
            match f.status {
                Status::Error => acc.errors += 1,
                Status::Warn => acc.warnings += 1,
                Status::Ok => acc.ok += 1,
            }
            acc
        })
    }

    /// Whether these counts trip the fail-on policy.
    pub fn trips(&self, fail_on: FailOn) -> bool {
        match fail_on {
            FailOn::Never => false,
            FailOn::Error => self.errors > 0,
            FailOn::Warn => self.errors > 0 || self.warnings > 0,
        }
    }
}

/// Final aggregate of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
    pub source_root: String,
    pub summary: Summary,
    pub findings: Vec<ReportItem>,
    pub connectors: Vec<ConnectorResult>,
    pub layers: Vec<LayerResult>,
}

impl AuditReport {
    /// Flatten layer findings in layer order and fold the summary over them.
    pub fn assemble(
        project_ref: Option<String>,
        source_root: String,
        connectors: Vec<ConnectorResult>,
        layers: Vec<LayerResult>,
    ) -> Self {
        let findings: Vec<ReportItem> = layers
            .iter()
            .filter_map(|l| l.findings.as_ref())
            .flatten()
            .cloned()
            .collect();
        Self {
            generated_at: Utc::now(),
            project_ref,
            source_root,
            summary: Summary::from_findings(&findings),
            findings,
            connectors,
            layers,
        }
    }

    pub fn should_fail(&self, fail_on: FailOn) -> bool {
        self.summary.trips(fail_on)
    }

    pub fn layer(&self, id: &str) -> Option<&LayerResult> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
