//! Per-file call-site extraction over tree-sitter ASTs.
//!
//! Recognized shapes (JS/TS and Python share the logic through [`SyntaxShape`]):
//! - `client.from('t')`, `client.table('t')`, `client.from_('t')` name a table;
//! - `client.rpc('fn', {...})` names a function, with named (object/dict),
//!   positional (array/list), or dynamic arguments;
//! - methods chained after a table call name columns
//!   (`.select('a, b')`, `.eq('c', v)`, `.insert({ d: 1 })`, ...);
//! - upper-case SQL string literals name tables and `FROM fn(...)` functions.

use std::path::Path;

use schemaguard_core::errors::ParseError;
use tree_sitter::{Node, Parser, Tree};

use super::language::{Language, SyntaxShape};
use super::sql_literals::{self, is_identifier};

/// Methods whose first string argument is a column name.
const COLUMN_FILTER_METHODS: &[&str] = &[
    "eq", "neq", "gt", "gte", "lt", "lte", "like", "ilike", "is_", "is", "in_", "in",
    "contains", "containedBy", "contained_by", "overlaps", "textSearch", "text_search",
    "order", "not", "not_", "filter",
];

/// Methods whose first argument is a row object (or array of them).
const ROW_WRITE_METHODS: &[&str] = &["insert", "update", "upsert"];

/// JS globals with a `.from(...)` that has nothing to do with tables.
const NON_CLIENT_RECEIVERS: &[&str] = &[
    "Array", "Buffer", "Object", "Promise", "Set", "Map", "Uint8Array", "Observable", "rxjs",
];

const MAX_CHAIN_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub table: String,
    pub line: u32,
}

/// How a call site passes arguments to an RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcArgs {
    /// Object/dict literal keys, or no argument object at all.
    Named(Vec<String>),
    /// Array/list literal or SQL call, by count.
    Positional(usize),
    /// Anything the scanner cannot see through (variables, spreads, computed keys).
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCall {
    pub function: String,
    pub args: RpcArgs,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
    pub line: u32,
}

/// Everything one file references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReferences {
    pub file: String,
    pub tables: Vec<TableReference>,
    pub rpc_calls: Vec<RpcCall>,
    pub columns: Vec<ColumnReference>,
}

/// Parse `source` with the grammar for `language`.
///
/// A tree containing syntax errors counts as a failed parse: the file then
/// contributes no references at all.
pub fn parse_source(source: &[u8], path: &Path, language: Language) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.ts_language())
        .map_err(|_| ParseError::GrammarNotFound {
            language: language.name().to_string(),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::TreeSitterError {
            path: path.to_path_buf(),
            message: "tree-sitter returned None".to_string(),
        })?;

    if tree.root_node().has_error() {
        return Err(ParseError::TreeSitterError {
            path: path.to_path_buf(),
            message: "source contains syntax errors".to_string(),
        });
    }
    Ok(tree)
}

/// Read and extract one file.
pub fn extract_file(
    path: &Path,
    language: Language,
    sql_literals: bool,
) -> Result<FileReferences, ParseError> {
    let source = std::fs::read(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    extract_source(&source, path, language, sql_literals)
}

/// Extract references from in-memory source.
pub fn extract_source(
    source: &[u8],
    path: &Path,
    language: Language,
    sql_literals: bool,
) -> Result<FileReferences, ParseError> {
    let tree = parse_source(source, path, language)?;
    let extractor = Extractor::new(source, language);
    let nodes = extractor.collect(tree.root_node());

    let mut refs = FileReferences {
        file: path.to_string_lossy().replace('\\', "/"),
        tables: extractor.table_references(&nodes.calls),
        rpc_calls: extractor.rpc_calls(&nodes.calls),
        columns: extractor.column_references(&nodes.calls),
    };

    if sql_literals {
        for node in &nodes.strings {
            let Some(text) = extractor.string_literal(*node) else {
                continue;
            };
            let found = sql_literals::scan_sql(&text);
            let line = line_of(*node);
            refs.tables
                .extend(found.tables.into_iter().map(|table| TableReference { table, line }));
            refs.rpc_calls
                .extend(found.functions.into_iter().map(|(function, n)| RpcCall {
                    function,
                    args: RpcArgs::Positional(n),
                    line,
                }));
        }
    }

    Ok(refs)
}

/// Split a PostgREST select list into plain column names.
///
/// Embedded resources (`author(name)`), `*`, and aggregates are skipped;
/// aliases (`alias:col`), casts (`col::text`), JSON paths (`col->k`), and
/// hints (`col!inner`) are reduced to the column.
pub fn parse_select_columns(select: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in select.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    parts
        .iter()
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() || part == "*" || part.contains('(') {
                return None;
            }
            column_name(part.split("::").next().unwrap_or(part).rsplit(':').next().unwrap_or(part))
        })
        .collect()
}

/// Reduce `col->key`, `col->>key`, and `col!hint` to `col`.
fn column_name(raw: &str) -> Option<String> {
    let name = raw.split("->").next().unwrap_or(raw);
    let name = name.split('!').next().unwrap_or(name).trim();
    is_identifier(name).then(|| name.to_string())
}

/// Validate a table or function name passed to the client API.
/// `public.` is dropped; other schemas are outside the audit.
fn api_identifier(raw: &str) -> Option<String> {
    let name = match raw.trim().split_once('.') {
        None => raw.trim(),
        Some((schema, name)) if schema == "public" => name,
        Some(_) => return None,
    };
    is_identifier(name).then(|| name.to_string())
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

struct CollectedNodes<'t> {
    calls: Vec<Node<'t>>,
    strings: Vec<Node<'t>>,
}

/// A decomposed `receiver.method(args)` call.
struct MethodCall<'t> {
    receiver: Node<'t>,
    method: String,
    args: Vec<Node<'t>>,
    node: Node<'t>,
}

struct Extractor<'s> {
    source: &'s [u8],
    language: Language,
    shape: &'static SyntaxShape,
}

impl<'s> Extractor<'s> {
    fn new(source: &'s [u8], language: Language) -> Self {
        Self {
            source,
            language,
            shape: language.shape(),
        }
    }

    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Pre-order walk collecting call and string nodes in document order.
    fn collect<'t>(&self, root: Node<'t>) -> CollectedNodes<'t> {
        let mut calls = Vec::new();
        let mut strings = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            if kind == self.shape.call {
                calls.push(node);
            } else if self.shape.string_kinds.contains(&kind) {
                strings.push(node);
            }
            let mut children = named_children(node);
            children.reverse();
            stack.extend(children);
        }
        CollectedNodes { calls, strings }
    }

    fn method_call<'t>(&self, node: Node<'t>) -> Option<MethodCall<'t>> {
        if node.kind() != self.shape.call {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        if function.kind() != self.shape.member {
            return None;
        }
        let receiver = function.child_by_field_name(self.shape.member_object_field)?;
        let property = function.child_by_field_name(self.shape.member_property_field)?;
        let args = node
            .child_by_field_name("arguments")
            .filter(|a| !self.shape.string_kinds.contains(&a.kind()))
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .map(|arg| self.unwrap_argument(arg))
            .collect();
        Some(MethodCall {
            receiver,
            method: self.text(property).to_string(),
            args,
            node,
        })
    }

    /// Python keyword arguments carry their value in a field.
    fn unwrap_argument<'t>(&self, arg: Node<'t>) -> Node<'t> {
        if arg.kind() == "keyword_argument" {
            arg.child_by_field_name("value").unwrap_or(arg)
        } else {
            arg
        }
    }

    /// Text of a string literal without quotes; `None` for interpolated strings.
    fn string_literal(&self, node: Node) -> Option<String> {
        if !self.shape.string_kinds.contains(&node.kind()) {
            return None;
        }
        let has_interpolation = named_children(node)
            .iter()
            .any(|c| matches!(c.kind(), "template_substitution" | "interpolation"));
        if has_interpolation {
            return None;
        }

        let raw = self.text(node);
        let body = match self.language {
            Language::Python => {
                let unprefixed = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
                if unprefixed.len() >= 6
                    && (unprefixed.starts_with("\"\"\"") || unprefixed.starts_with("'''"))
                {
                    &unprefixed[3..unprefixed.len() - 3]
                } else if unprefixed.len() >= 2 {
                    &unprefixed[1..unprefixed.len() - 1]
                } else {
                    return None;
                }
            }
            _ if raw.len() >= 2 => &raw[1..raw.len() - 1],
            _ => return None,
        };
        Some(body.to_string())
    }

    fn first_string_arg(&self, call: &MethodCall) -> Option<String> {
        call.args.first().and_then(|a| self.string_literal(*a))
    }

    fn is_table_call(&self, call: &MethodCall) -> Option<String> {
        if !self.shape.table_methods.contains(&call.method.as_str()) {
            return None;
        }
        if NON_CLIENT_RECEIVERS.contains(&self.text(call.receiver)) {
            return None;
        }
        api_identifier(&self.first_string_arg(call)?)
    }

    fn table_references(&self, calls: &[Node]) -> Vec<TableReference> {
        calls
            .iter()
            .filter_map(|node| self.method_call(*node))
            .filter_map(|call| {
                self.is_table_call(&call).map(|table| TableReference {
                    table,
                    line: line_of(call.node),
                })
            })
            .collect()
    }

    fn rpc_calls(&self, calls: &[Node]) -> Vec<RpcCall> {
        calls
            .iter()
            .filter_map(|node| self.method_call(*node))
            .filter(|call| call.method == "rpc")
            .filter_map(|call| {
                let function = api_identifier(&self.first_string_arg(&call)?)?;
                Some(RpcCall {
                    function,
                    args: self.classify_rpc_args(call.args.get(1).copied()),
                    line: line_of(call.node),
                })
            })
            .collect()
    }

    fn classify_rpc_args(&self, arg: Option<Node>) -> RpcArgs {
        let Some(arg) = arg else {
            return RpcArgs::Named(Vec::new());
        };
        let kind = arg.kind();
        if kind == self.shape.object_kind {
            match self.object_keys(arg) {
                Some(keys) => RpcArgs::Named(keys),
                None => RpcArgs::Dynamic,
            }
        } else if kind == self.shape.array_kind {
            let items = named_children(arg);
            if items
                .iter()
                .any(|i| matches!(i.kind(), "spread_element" | "list_splat"))
            {
                RpcArgs::Dynamic
            } else {
                RpcArgs::Positional(items.len())
            }
        } else {
            RpcArgs::Dynamic
        }
    }

    /// Literal keys of an object/dict literal; `None` if any key is computed or spread.
    fn object_keys(&self, node: Node) -> Option<Vec<String>> {
        let mut keys = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "pair" => {
                    let key = child.child_by_field_name("key")?;
                    let name = match key.kind() {
                        "property_identifier" | "identifier" => self.text(key).to_string(),
                        k if self.shape.string_kinds.contains(&k) => self.string_literal(key)?,
                        "number" | "integer" => self.text(key).to_string(),
                        _ => return None,
                    };
                    keys.push(name);
                }
                "shorthand_property_identifier" => keys.push(self.text(child).to_string()),
                _ => return None,
            }
        }
        Some(keys)
    }

    /// Table a method chain hangs off, if any (`client.from('t').select().eq()`).
    fn chain_table(&self, mut node: Node) -> Option<String> {
        for _ in 0..MAX_CHAIN_DEPTH {
            match node.kind() {
                "parenthesized_expression" | "await_expression" | "await" => {
                    node = *named_children(node).first()?;
                }
                k if k == self.shape.member => {
                    node = node.child_by_field_name(self.shape.member_object_field)?;
                }
                k if k == self.shape.call => {
                    let call = self.method_call(node)?;
                    if let Some(table) = self.is_table_call(&call) {
                        return Some(table);
                    }
                    node = call.receiver;
                }
                _ => return None,
            }
        }
        None
    }

    fn column_references(&self, calls: &[Node]) -> Vec<ColumnReference> {
        let mut columns = Vec::new();
        for node in calls {
            let Some(call) = self.method_call(*node) else {
                continue;
            };
            let is_select = call.method == "select";
            let is_filter = COLUMN_FILTER_METHODS.contains(&call.method.as_str());
            let is_write = ROW_WRITE_METHODS.contains(&call.method.as_str());
            let is_match = call.method == "match";
            if !(is_select || is_filter || is_write || is_match) {
                continue;
            }
            let Some(table) = self.chain_table(call.receiver) else {
                continue;
            };

            let names: Vec<String> = if is_select {
                self.first_string_arg(&call)
                    .map(|s| parse_select_columns(&s))
                    .unwrap_or_default()
            } else if is_filter {
                self.first_string_arg(&call)
                    .and_then(|s| column_name(&s))
                    .into_iter()
                    .collect()
            } else {
                call.args
                    .first()
                    .and_then(|arg| self.row_keys(*arg))
                    .unwrap_or_default()
            };

            let line = line_of(call.node);
            columns.extend(names.into_iter().map(|column| ColumnReference {
                table: table.clone(),
                column,
                line,
            }));
        }
        columns
    }

    /// Keys of a row object, or of the first row in an array of them.
    fn row_keys(&self, node: Node) -> Option<Vec<String>> {
        let kind = node.kind();
        if kind == self.shape.object_kind {
            self.object_keys(node)
        } else if kind == self.shape.array_kind {
            let first = *named_children(node).first()?;
            (first.kind() == self.shape.object_kind)
                .then(|| self.object_keys(first))
                .flatten()
        } else {
            None
        }
    }
}
