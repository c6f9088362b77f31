//! Snapshot of a live database schema.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A foreign-key edge. Targets outside the audited schema are schema-qualified
/// (`auth.users`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl Relation {
    pub fn targets_other_schema(&self) -> bool {
        self.target_table.contains('.')
    }
}

/// One input argument of a stored function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArgument {
    /// Declared name, or `$n` for unnamed positional arguments.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// The argument has a default value and may be omitted by callers.
    #[serde(default)]
    pub optional: bool,
}

/// A stored function's call contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub arguments: Vec<FunctionArgument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

impl FunctionSignature {
    pub fn required_arguments(&self) -> impl Iterator<Item = &FunctionArgument> {
        self.arguments.iter().filter(|a| !a.optional)
    }

    pub fn required_count(&self) -> usize {
        self.required_arguments().count()
    }
}

/// One row-level-security policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePolicy {
    pub name: String,
    /// SELECT, INSERT, UPDATE, DELETE or ALL.
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// Row-level-security state of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RlsState {
    pub enabled: bool,
    #[serde(default)]
    pub policies: Vec<TablePolicy>,
}

/// An index, reduced to its leading column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub leading_column: String,
}

/// Structural snapshot of a database schema, produced atomically by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub tables: BTreeSet<String>,
    #[serde(default)]
    pub functions: BTreeSet<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ColumnInfo>>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub function_signatures: BTreeMap<String, FunctionSignature>,
    /// Only tables whose RLS state was introspected appear here.
    #[serde(default)]
    pub rls: BTreeMap<String, RlsState>,
    /// `None` when the provider cannot introspect indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<BTreeMap<String, Vec<IndexInfo>>>,
}

impl DatabaseMetadata {
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn columns_of(&self, table: &str) -> &[ColumnInfo] {
        self.columns.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns_of(table).iter().any(|c| c.name == column)
    }

    /// Whether some index on `table` leads with `column`.
    /// Returns `None` when indexes were not introspected.
    pub fn is_indexed(&self, table: &str, column: &str) -> Option<bool> {
        let indexes = self.indexes.as_ref()?;
        Some(
            indexes
                .get(table)
                .is_some_and(|idx| idx.iter().any(|i| i.leading_column == column)),
        )
    }

    /// A copy of this snapshot with freshly introspected RLS states layered on top.
    pub fn with_rls(&self, rls: &BTreeMap<String, RlsState>) -> Self {
        let mut merged = self.clone();
        for (table, state) in rls {
            merged.rls.insert(table.clone(), state.clone());
        }
        merged
    }
}
