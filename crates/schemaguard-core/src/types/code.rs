//! What the application code expects of the database.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Prefix of argument names synthesized for positional call sites.
pub const POSITIONAL_PREFIX: char = '$';

/// Synthesized name of the `index`-th positional argument (1-based).
pub fn positional_name(index: usize) -> String {
    format!("{POSITIONAL_PREFIX}{index}")
}

/// Whether `name` was synthesized for a positional argument.
pub fn is_positional_name(name: &str) -> bool {
    name.strip_prefix(POSITIONAL_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Table,
    Function,
    Column,
}

/// Where one identifier was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeReference {
    pub kind: ReferenceKind,
    /// `table`, `function`, or `table.column`.
    pub name: String,
    pub file: String,
    /// 1-based.
    pub line: u32,
}

/// Snapshot of the identifiers a source tree references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeScanResult {
    #[serde(default)]
    pub tables: BTreeSet<String>,
    #[serde(default)]
    pub functions: BTreeSet<String>,
    /// Argument names passed per RPC, merged over call sites. Positional call
    /// sites contribute `$1..$n`.
    #[serde(default)]
    pub rpc_arguments: BTreeMap<String, Vec<String>>,
    /// Columns the code reads or writes, per table.
    #[serde(default)]
    pub columns: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub references: Vec<CodeReference>,
    #[serde(default)]
    pub files_scanned: usize,
    #[serde(default)]
    pub files_failed: usize,
}

impl CodeScanResult {
    /// Locations of references of `kind` named `name`, as `file:line` strings.
    pub fn locations(&self, kind: ReferenceKind, name: &str) -> Vec<String> {
        self.references
            .iter()
            .filter(|r| r.kind == kind && r.name == name)
            .map(|r| format!("{}:{}", r.file, r.line))
            .collect()
    }
}
