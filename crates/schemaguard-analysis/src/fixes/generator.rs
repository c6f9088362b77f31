use schemaguard_core::types::code::is_positional_name;
use schemaguard_core::types::fix::{FixType, Severity, SuggestedFix};
use schemaguard_core::types::report::{CheckCategory, Finding};
use schemaguard_core::types::schema::DatabaseMetadata;

use super::sql::{derived_name, qualified, quote_ident, quote_literal};

/// Columns every generated table starts with.
const BASE_COLUMNS: &[&str] = &["id", "created_at"];

/// Column that marks a table as owned by an authenticated user.
const OWNER_COLUMN: &str = "user_id";

/// One fix per actionable finding, in finding order.
pub fn generate_fixes(findings: &[Finding], metadata: &DatabaseMetadata) -> Vec<SuggestedFix> {
    findings
        .iter()
        .filter_map(|f| generate_fix(f, metadata))
        .collect()
}

/// The fix for one finding, or `None` when no safe automated fix exists.
pub fn generate_fix(finding: &Finding, metadata: &DatabaseMetadata) -> Option<SuggestedFix> {
    let item = &finding.item;
    let schema = metadata.schema.as_str();
    match finding.check {
        CheckCategory::MissingTable => {
            let table = finding.subject.as_str();
            Some(fix(
                FixType::CreateTable,
                format!("Create missing table {table}"),
                create_table_sql(schema, table, &item.context_strings("columns")),
                Some(table),
                None,
                Severity::High,
            ))
        }
        CheckCategory::MissingFunction => {
            let function = finding.subject.as_str();
            Some(fix(
                FixType::CreateFunction,
                format!("Create stub for missing function {function}"),
                create_function_sql(schema, function, &item.context_strings("arguments")),
                None,
                Some(function),
                Severity::High,
            ))
        }
        CheckCategory::RlsGap => {
            let table = finding.subject.as_str();
            match item.suggested_fix.as_ref()?.fix_type {
                FixType::EnableRls => Some(fix(
                    FixType::EnableRls,
                    format!("Enable row level security on {table}"),
                    format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY;", qualified(schema, table)),
                    Some(table),
                    None,
                    Severity::Medium,
                )),
                FixType::AddRlsPolicy => Some(fix(
                    FixType::AddRlsPolicy,
                    format!("Add a row level security policy to {table}"),
                    add_policy_sql(schema, table, metadata.has_column(table, OWNER_COLUMN)),
                    Some(table),
                    None,
                    Severity::Medium,
                )),
                _ => None,
            }
        }
        CheckCategory::MissingColumn => {
            let table = item.context_str("table")?;
            let column = item.context_str("column")?;
            Some(fix(
                FixType::AddColumn,
                format!("Add missing column {column} to {table}"),
                format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} text;",
                    qualified(schema, table),
                    quote_ident(column)
                ),
                Some(table),
                None,
                Severity::Medium,
            ))
        }
        CheckCategory::UnindexedForeignKey => {
            let table = item.context_str("table")?;
            let column = item.context_str("column")?;
            let index = derived_name(&["idx", table, column]);
            Some(fix(
                FixType::CreateIndex,
                format!("Index foreign key column {table}.{column}"),
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                    quote_ident(&index),
                    qualified(schema, table),
                    quote_ident(column)
                ),
                Some(table),
                None,
                Severity::Low,
            ))
        }
        // Broken relations cannot be repaired blindly; argument mismatches are informational.
        CheckCategory::BrokenRelation | CheckCategory::RpcArgumentMismatch => None,
    }
}

fn fix(
    fix_type: FixType,
    description: String,
    sql: String,
    table: Option<&str>,
    function: Option<&str>,
    severity: Severity,
) -> SuggestedFix {
    SuggestedFix {
        fix_type,
        description,
        sql,
        table: table.map(str::to_string),
        function: function.map(str::to_string),
        severity,
        auto_apply: fix_type.is_auto_applicable(),
    }
}

fn create_table_sql(schema: &str, table: &str, expected_columns: &[String]) -> String {
    let mut lines = vec![
        "  id uuid PRIMARY KEY DEFAULT gen_random_uuid()".to_string(),
        "  created_at timestamptz NOT NULL DEFAULT now()".to_string(),
    ];
    lines.extend(
        expected_columns
            .iter()
            .filter(|c| !BASE_COLUMNS.contains(&c.as_str()))
            .map(|c| format!("  {} text", quote_ident(c))),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        qualified(schema, table),
        lines.join(",\n")
    )
}

fn create_function_sql(schema: &str, function: &str, arguments: &[String]) -> String {
    let params: Vec<String> = arguments
        .iter()
        .map(|a| {
            if is_positional_name(a) {
                "text".to_string()
            } else {
                format!("{} text", quote_ident(a))
            }
        })
        .collect();
    let message = quote_literal(&format!("{function} is not implemented"));
    format!(
        "CREATE OR REPLACE FUNCTION {}({})\nRETURNS jsonb\nLANGUAGE plpgsql\nAS $$\nBEGIN\n  RAISE EXCEPTION {message};\nEND;\n$$;",
        qualified(schema, function),
        params.join(", ")
    )
}

fn add_policy_sql(schema: &str, table: &str, has_owner: bool) -> String {
    let (policy, body) = if has_owner {
        let name = derived_name(&[table, "owner_access"]);
        let body = format!(
            "CREATE POLICY {} ON {} FOR ALL TO authenticated USING (auth.uid() = {OWNER_COLUMN}) WITH CHECK (auth.uid() = {OWNER_COLUMN})",
            quote_ident(&name),
            qualified(schema, table)
        );
        (name, body)
    } else {
        let name = derived_name(&[table, "authenticated_read"]);
        let body = format!(
            "CREATE POLICY {} ON {} FOR SELECT TO authenticated USING (true)",
            quote_ident(&name),
            qualified(schema, table)
        );
        (name, body)
    };
    format!(
        "DO $$\nBEGIN\n  IF NOT EXISTS (\n    SELECT 1 FROM pg_policies\n    WHERE schemaname = {} AND tablename = {} AND policyname = {}\n  ) THEN\n    {body};\n  END IF;\nEND\n$$;",
        quote_literal(if schema.is_empty() { "public" } else { schema }),
        quote_literal(table),
        quote_literal(&policy)
    )
}
