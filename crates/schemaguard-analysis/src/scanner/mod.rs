//! Static source-tree scanner: walker → per-file AST extraction → merge.

pub mod cancellation;
pub mod code_scanner;
pub mod extract;
pub mod language;
pub mod sql_literals;
pub mod walker;

pub use cancellation::ScanCancellation;
pub use code_scanner::CodeScanner;
pub use extract::{FileReferences, RpcArgs, RpcCall, TableReference};
pub use language::Language;
