//! Parallel source walker using the `ignore` crate's `WalkParallel`.
//!
//! Honors `.gitignore`, `.schemaguardignore` (gitignore syntax, hierarchical)
//! and the default ignore patterns. Only files in a supported language are kept.

use std::path::{Path, PathBuf};

use crossbeam_channel as channel;
use schemaguard_core::config::ScanConfig;
use schemaguard_core::errors::ScanError;

use super::cancellation::ScanCancellation;
use super::language::Language;

/// Directories never worth scanning for application code.
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    ".next",
    ".nuxt",
    ".svelte-kit",
    "__pycache__",
    ".pytest_cache",
    "coverage",
    "vendor",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
];

/// Per-directory ignore file, gitignore syntax.
pub const IGNORE_FILENAME: &str = ".schemaguardignore";

/// A source file selected for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub language: Language,
}

/// Walk `root` in parallel, returning supported source files sorted by path.
pub fn walk_directory(
    root: &Path,
    config: &ScanConfig,
    cancellation: &ScanCancellation,
) -> Result<Vec<DiscoveredFile>, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let (tx, rx) = channel::unbounded();

    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILENAME)
        .max_filesize(Some(config.effective_max_file_size()))
        .follow_links(config.effective_follow_symlinks());

    let threads = config.effective_threads();
    if threads > 0 {
        builder.threads(threads);
    }

    // Positive override patterns whitelist, negated ones blacklist.
    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    for pattern in &config.include {
        if let Err(e) = overrides.add(pattern) {
            tracing::warn!(pattern = %pattern, error = %e, "ignoring invalid include pattern");
        }
    }
    for pattern in DEFAULT_IGNORES {
        let _ = overrides.add(&format!("!{pattern}/**"));
        let _ = overrides.add(&format!("!{pattern}"));
    }
    for pattern in &config.extra_ignore {
        if let Err(e) = overrides.add(&format!("!{pattern}")) {
            tracing::warn!(pattern = %pattern, error = %e, "ignoring invalid ignore pattern");
        }
    }
    match overrides.build() {
        Ok(built) => {
            builder.overrides(built);
        }
        Err(e) => tracing::warn!(error = %e, "walker overrides rejected"),
    }

    builder.build_parallel().run(|| {
        let tx = tx.clone();
        let cancellation = cancellation.clone();
        Box::new(move |entry| {
            if cancellation.is_cancelled() {
                return ignore::WalkState::Quit;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(_) => return ignore::WalkState::Continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                return ignore::WalkState::Continue;
            }

            let path = entry.path().to_path_buf();
            let Some(language) = Language::from_extension(path.extension().and_then(|e| e.to_str()))
            else {
                return ignore::WalkState::Continue;
            };
            let _ = tx.send(DiscoveredFile { path, language });
            ignore::WalkState::Continue
        })
    });

    drop(tx);

    if cancellation.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    let mut files: Vec<DiscoveredFile> = rx.into_iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
