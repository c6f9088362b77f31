//! SQL text builders for suggested fixes.

use crate::scanner::sql_literals::is_identifier;

/// Words that must be quoted when used as identifiers.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_date",
    "current_role", "current_time", "current_timestamp", "current_user", "default",
    "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for",
    "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset",
    "on", "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "table", "then", "to", "trailing", "true", "union",
    "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

/// Postgres truncates identifiers beyond this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Quote `name` unless it is a plain lower-case, non-reserved identifier.
pub fn quote_ident(name: &str) -> String {
    let plain = is_identifier(name)
        && !name.chars().any(|c| c.is_ascii_uppercase())
        && !RESERVED.contains(&name);
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `<schema>.<name>`, each part quoted as needed. An empty schema means `public`.
pub fn qualified(schema: &str, name: &str) -> String {
    let schema = if schema.is_empty() { "public" } else { schema };
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Derived object name (index, policy), kept within the identifier limit.
pub fn derived_name(parts: &[&str]) -> String {
    let mut name = parts.join("_");
    if name.len() > MAX_IDENTIFIER_LEN {
        let mut end = MAX_IDENTIFIER_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}
