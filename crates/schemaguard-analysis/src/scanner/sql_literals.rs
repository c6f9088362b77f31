//! Table and function names inside raw SQL string literals.
//!
//! Only strings that open with an upper-case statement keyword are treated as
//! SQL; prose like "Select a plan from the list" is left alone.

use std::sync::LazyLock;

use regex::Regex;

static STATEMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:SELECT\s+[\s\S]+?\s+(?i:from)\s|INSERT\s+(?i:into)\s|UPDATE\s+\S+\s+(?i:set)\s|DELETE\s+(?i:from)\s|WITH\s+\w+\s+(?i:as)\s*\()")
        .expect("statement regex is valid")
});

static RELATION_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(from|join|into|update)\s+(?:only\s+)?((?:"?[a-z_][a-z0-9_]*"?\s*\.\s*)?"?[a-z_][a-z0-9_]*"?)"#,
    )
    .expect("relation regex is valid")
});

/// Words that, directly before `FROM`, mean it is not a relation clause
/// (`EXTRACT(EPOCH FROM ts)`, `IS DISTINCT FROM x`, `TRIM(BOTH FROM s)`).
const NON_RELATION_PREFIXES: &[&str] = &[
    "distinct", "epoch", "year", "month", "day", "hour", "minute", "second", "dow", "doy",
    "week", "quarter", "both", "leading", "trailing",
];

/// `WITH name AS (` and `, name AS (` heads of common table expressions.
static CTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:\bwith(?:\s+recursive)?\s+|,\s*)("?[a-z_][a-z0-9_]*"?)\s+as\s*(?:(?:not\s+)?materialized\s*)?\("#)
        .expect("cte regex is valid")
});

const KEYWORDS: &[&str] = &["select", "lateral", "only", "values", "set", "where"];

/// Set-returning built-ins that show up in `FROM` without being application functions.
const BUILTIN_FUNCTIONS: &[&str] = &[
    "unnest",
    "generate_series",
    "json_each",
    "jsonb_each",
    "json_array_elements",
    "jsonb_array_elements",
    "json_to_recordset",
    "jsonb_to_recordset",
    "regexp_matches",
    "string_to_table",
];

/// Identifiers found in one SQL literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlReferences {
    pub tables: Vec<String>,
    /// Function name and positional argument count.
    pub functions: Vec<(String, usize)>,
}

pub fn looks_like_sql(text: &str) -> bool {
    STATEMENT_START.is_match(text)
}

/// Extract relation and `FROM fn(...)` references from a SQL string.
pub fn scan_sql(text: &str) -> SqlReferences {
    let mut refs = SqlReferences::default();
    if !looks_like_sql(text) {
        return refs;
    }

    let ctes: Vec<String> = CTE_NAME
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|name| normalize_identifier(name.as_str()))
        .collect();

    for caps in RELATION_REF.captures_iter(text) {
        let (Some(clause), Some(name)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let keyword = clause.as_str().to_ascii_lowercase();

        if keyword == "from" {
            let before = text[..clause.start()].trim_end();
            let prev_word = before
                .rsplit(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            if NON_RELATION_PREFIXES.contains(&prev_word.as_str()) {
                continue;
            }
        }

        let Some(ident) = normalize_identifier(name.as_str()) else {
            continue;
        };
        if KEYWORDS.contains(&ident.as_str()) || ctes.contains(&ident) {
            continue;
        }

        // `INTO t (cols)` is a column list; only `FROM`/`JOIN` can call a function.
        let rest = text[name.end()..].trim_start();
        let callable = keyword == "from" || keyword == "join";
        match rest.strip_prefix('(') {
            Some(args) if callable => {
                if !BUILTIN_FUNCTIONS.contains(&ident.as_str()) {
                    refs.functions.push((ident, count_call_args(args)));
                }
            }
            _ => refs.tables.push(ident),
        }
    }

    refs
}

/// Folds unquoted names to lower case, unquotes, and drops a `public.`
/// qualifier. Names qualified with any other schema are outside the audit
/// and yield `None`.
fn normalize_identifier(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split('.').map(str::trim).collect();
    let name = match parts.as_slice() {
        [name] => *name,
        [schema, name] if schema.trim_matches('"').eq_ignore_ascii_case("public") => *name,
        _ => return None,
    };
    if let Some(quoted) = name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        return is_identifier(quoted).then(|| quoted.to_string());
    }
    is_identifier(name).then(|| name.to_ascii_lowercase())
}

/// Plain SQL identifier: letter or underscore, then letters, digits, underscores.
pub fn is_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Count top-level arguments of a call whose opening paren was already consumed.
fn count_call_args(after_paren: &str) -> usize {
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut saw_token = false;
    let mut in_quote = false;
    for ch in after_paren.chars() {
        if in_quote {
            if ch == '\'' {
                in_quote = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_quote = true;
                saw_token = true;
            }
            '(' => {
                depth += 1;
                saw_token = true;
            }
            ')' if depth == 0 => break,
            ')' => depth -= 1,
            ',' if depth == 0 => commas += 1,
            c if !c.is_whitespace() => saw_token = true,
            _ => {}
        }
    }
    if saw_token {
        commas + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(sql: &str) -> Vec<String> {
        scan_sql(sql).tables
    }

    #[test]
    fn insert_column_list_is_not_a_call() {
        let refs = scan_sql("INSERT INTO orders (user_id, total) VALUES ($1, $2)");
        assert_eq!(refs.tables, vec!["orders"]);
        assert!(refs.functions.is_empty());
    }

    #[test]
    fn upsert_does_not_read_set_as_a_table() {
        assert_eq!(
            tables("INSERT INTO public.orders (id) VALUES ($1) ON CONFLICT (id) DO UPDATE SET id = excluded.id"),
            vec!["orders"]
        );
    }

    #[test]
    fn update_and_delete_targets() {
        assert_eq!(tables("UPDATE carts SET closed = true WHERE id = $1"), vec!["carts"]);
        assert_eq!(tables("DELETE FROM sessions WHERE token = $1"), vec!["sessions"]);
    }

    #[test]
    fn joins_are_tables() {
        assert_eq!(
            tables("SELECT o.id FROM orders o JOIN users u ON u.id = o.user_id"),
            vec!["orders", "users"]
        );
    }

    #[test]
    fn cte_names_are_not_tables() {
        assert_eq!(
            tables("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent"),
            vec!["orders"]
        );
        assert_eq!(
            tables("WITH a AS (SELECT * FROM orders), b AS MATERIALIZED (SELECT * FROM users) SELECT * FROM a JOIN b ON true"),
            vec!["orders", "users"]
        );
    }

    #[test]
    fn subquery_tables_are_kept() {
        assert_eq!(
            tables("SELECT * FROM users WHERE id IN (SELECT user_id FROM orders)"),
            vec!["users", "orders"]
        );
    }

    #[test]
    fn from_inside_expressions_is_skipped() {
        assert_eq!(
            tables("SELECT EXTRACT(EPOCH FROM created_at) FROM orders WHERE a IS DISTINCT FROM b"),
            vec!["orders"]
        );
    }

    #[test]
    fn schema_qualification() {
        assert_eq!(
            tables("SELECT * FROM public.orders JOIN auth.users ON users.id = orders.user_id"),
            vec!["orders"]
        );
        assert_eq!(tables(r#"SELECT * FROM "UserEvents""#), vec!["UserEvents"]);
    }

    #[test]
    fn from_function_calls_count_arguments() {
        let refs = scan_sql("SELECT * FROM search_docs($1, lower($2)) JOIN get_stats() ON true");
        assert_eq!(
            refs.functions,
            vec![("search_docs".to_string(), 2), ("get_stats".to_string(), 0)]
        );
        assert!(refs.tables.is_empty());
        assert!(scan_sql("SELECT * FROM unnest($1)").functions.is_empty());
    }

    #[test]
    fn prose_is_not_sql() {
        assert_eq!(scan_sql("Select a plan from the list"), SqlReferences::default());
        assert_eq!(scan_sql("Update your profile from settings"), SqlReferences::default());
        assert!(!looks_like_sql("Please insert into the slot"));
    }
}
