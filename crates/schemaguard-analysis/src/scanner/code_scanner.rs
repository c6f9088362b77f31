//! Top-level code scanner: walk → parallel per-file extraction → deterministic merge.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use schemaguard_core::config::ScanConfig;
use schemaguard_core::errors::ScanError;
use schemaguard_core::types::code::{positional_name, CodeReference, CodeScanResult, ReferenceKind};

use super::cancellation::ScanCancellation;
use super::extract::{self, FileReferences, RpcArgs, RpcCall, TableReference};
use super::walker;

/// Scans a source tree for the tables, functions, and columns it references.
pub struct CodeScanner {
    config: ScanConfig,
    cancellation: ScanCancellation,
}

impl CodeScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cancellation: ScanCancellation::new(),
        }
    }

    /// Scanner polling an externally owned cancellation handle.
    pub fn with_cancellation(config: ScanConfig, cancellation: ScanCancellation) -> Self {
        Self {
            config,
            cancellation,
        }
    }

    /// Handle for cancelling a scan from another thread.
    pub fn cancellation(&self) -> &ScanCancellation {
        &self.cancellation
    }

    /// Scan every supported file under `root`.
    ///
    /// Files that cannot be read or parsed are logged and counted in
    /// `files_failed`; they never abort the scan. A cancelled handle stays
    /// cancelled.
    pub fn scan(&self, root: &Path) -> Result<CodeScanResult, ScanError> {
        let start = Instant::now();

        let files = walker::walk_directory(root, &self.config, &self.cancellation)?;
        let sql_literals = self.config.effective_sql_literals();
        let failed = AtomicUsize::new(0);

        let per_file: Vec<FileReferences> = files
            .par_iter()
            .filter_map(|file| {
                if self.cancellation.is_cancelled() {
                    return None;
                }
                match extract::extract_file(&file.path, file.language, sql_literals) {
                    Ok(mut refs) => {
                        refs.file = relative_path(root, &file.path);
                        Some(refs)
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %file.path.display(),
                            error = %e,
                            "skipping unparseable file"
                        );
                        failed.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                }
            })
            .collect();

        if self.cancellation.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let mut result = merge(per_file);
        result.files_failed = failed.into_inner();
        result.files_scanned = files.len() - result.files_failed;

        tracing::info!(
            files = files.len(),
            failed = result.files_failed,
            tables = result.tables.len(),
            functions = result.functions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "code scan complete"
        );
        Ok(result)
    }
}

/// Distinct table names referenced in `files`.
pub fn find_table_references(files: &[FileReferences]) -> BTreeSet<String> {
    files
        .iter()
        .flat_map(|f| f.tables.iter().map(|t: &TableReference| t.table.clone()))
        .collect()
}

/// Every RPC call site in `files`, in file order.
pub fn find_rpc_calls(files: &[FileReferences]) -> Vec<RpcCall> {
    files.iter().flat_map(|f| f.rpc_calls.iter().cloned()).collect()
}

/// Merge call sites into one argument list per function.
///
/// Named call sites are unioned and win over positional ones; positional
/// call sites keep the largest arity as `$1..$n`. A function seen only
/// through dynamic arguments gets no entry.
pub fn extract_rpc_arguments(calls: &[RpcCall]) -> BTreeMap<String, Vec<String>> {
    #[derive(Default)]
    struct Merged {
        named: Option<BTreeSet<String>>,
        positional: Option<usize>,
    }

    let mut merged: FxHashMap<&str, Merged> = FxHashMap::default();
    for call in calls {
        let entry = merged.entry(call.function.as_str()).or_default();
        match &call.args {
            RpcArgs::Named(keys) => entry
                .named
                .get_or_insert_with(BTreeSet::new)
                .extend(keys.iter().cloned()),
            RpcArgs::Positional(n) => {
                entry.positional = Some(entry.positional.map_or(*n, |m| m.max(*n)));
            }
            RpcArgs::Dynamic => {}
        }
    }

    merged
        .into_iter()
        .filter_map(|(function, m)| {
            let args = match (m.named, m.positional) {
                (Some(named), _) => named.into_iter().collect(),
                (None, Some(n)) => (1..=n).map(positional_name).collect(),
                (None, None) => return None,
            };
            Some((function.to_string(), args))
        })
        .collect()
}

fn merge(files: Vec<FileReferences>) -> CodeScanResult {
    let rpc_calls = find_rpc_calls(&files);
    let mut result = CodeScanResult {
        tables: find_table_references(&files),
        functions: rpc_calls.iter().map(|c| c.function.clone()).collect(),
        rpc_arguments: extract_rpc_arguments(&rpc_calls),
        ..Default::default()
    };

    for file in files {
        for t in file.tables {
            result.references.push(CodeReference {
                kind: ReferenceKind::Table,
                name: t.table,
                file: file.file.clone(),
                line: t.line,
            });
        }
        for c in file.rpc_calls {
            result.references.push(CodeReference {
                kind: ReferenceKind::Function,
                name: c.function,
                file: file.file.clone(),
                line: c.line,
            });
        }
        for c in file.columns {
            result.references.push(CodeReference {
                kind: ReferenceKind::Column,
                name: format!("{}.{}", c.table, c.column),
                file: file.file.clone(),
                line: c.line,
            });
            result.columns.entry(c.table).or_default().insert(c.column);
        }
    }

    result.references.sort();
    result.references.dedup();
    result
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
