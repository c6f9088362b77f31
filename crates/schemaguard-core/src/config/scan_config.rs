//! Code scanner configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Settings for walking and parsing the source tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    /// Files larger than this many bytes are skipped. Unset means 1 MiB.
    pub max_file_size: Option<u64>,
    /// Walker threads; 0 or unset lets `ignore` pick.
    pub threads: Option<usize>,
    /// Gitignore-style globs (`src/**`). When non-empty only matches are scanned.
    pub include: Vec<String>,
    /// Ignore globs on top of `.gitignore` and `.schemaguardignore`.
    pub extra_ignore: Vec<String>,
    pub follow_symlinks: Option<bool>,
    /// Read table and function names out of SQL string literals. On unless disabled.
    pub sql_literals: Option<bool>,
}

impl ScanConfig {
    pub fn effective_max_file_size(&self) -> u64 {
        self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE)
    }

    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_default()
    }

    pub fn effective_follow_symlinks(&self) -> bool {
        self.follow_symlinks.unwrap_or(false)
    }

    pub fn effective_sql_literals(&self) -> bool {
        self.sql_literals.unwrap_or(true)
    }
}
