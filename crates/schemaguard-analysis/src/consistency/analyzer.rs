use schemaguard_core::types::code::{CodeScanResult, ReferenceKind};
use schemaguard_core::types::fix::FixType;
use schemaguard_core::types::report::{CheckCategory, Finding, ReportItem};
use schemaguard_core::types::schema::{DatabaseMetadata, Relation};

use super::rpc_arguments::compare_arguments;

/// Run every check. Findings are ordered by check category, then subject.
pub fn analyze(metadata: &DatabaseMetadata, code: &CodeScanResult) -> Vec<Finding> {
    analyze_with(metadata, code, &CheckCategory::ALL)
}

/// Run only the given checks, with the same ordering as [`analyze`].
pub fn analyze_with(
    metadata: &DatabaseMetadata,
    code: &CodeScanResult,
    checks: &[CheckCategory],
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for check in CheckCategory::ALL {
        if !checks.contains(&check) {
            continue;
        }
        match check {
            CheckCategory::MissingTable => missing_tables(metadata, code, &mut findings),
            CheckCategory::MissingFunction => missing_functions(metadata, code, &mut findings),
            CheckCategory::BrokenRelation => broken_relations(metadata, &mut findings),
            CheckCategory::RpcArgumentMismatch => argument_mismatches(metadata, code, &mut findings),
            CheckCategory::RlsGap => rls_gaps(metadata, &mut findings),
            CheckCategory::MissingColumn => missing_columns(metadata, code, &mut findings),
            CheckCategory::UnindexedForeignKey => unindexed_foreign_keys(metadata, &mut findings),
        }
    }

    // Stable: equal (check, subject) pairs keep their deterministic input order.
    findings.sort_by(|a, b| (a.check, &a.subject).cmp(&(b.check, &b.subject)));
    tracing::debug!(count = findings.len(), "consistency analysis complete");
    findings
}

fn finding(check: CheckCategory, subject: &str, item: ReportItem) -> Finding {
    Finding {
        check,
        subject: subject.to_string(),
        item,
    }
}

fn missing_tables(metadata: &DatabaseMetadata, code: &CodeScanResult, out: &mut Vec<Finding>) {
    for table in code.tables.iter().filter(|t| !metadata.has_table(t)) {
        let expected: Vec<String> = code
            .columns
            .get(table)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        let item = ReportItem::error(format!("Table \"{table}\" is referenced in code but does not exist"))
            .with_fix(FixType::CreateTable, table.as_str())
            .with_context("table", table.as_str())
            .with_context("columns", expected)
            .with_context("locations", code.locations(ReferenceKind::Table, table));
        out.push(finding(CheckCategory::MissingTable, table, item));
    }
}

fn missing_functions(metadata: &DatabaseMetadata, code: &CodeScanResult, out: &mut Vec<Finding>) {
    for function in code.functions.iter().filter(|f| !metadata.has_function(f)) {
        let arguments = code.rpc_arguments.get(function).cloned().unwrap_or_default();
        let item = ReportItem::error(format!(
            "Function \"{function}\" is called in code but does not exist"
        ))
        .with_fix(FixType::CreateFunction, function.as_str())
        .with_context("function", function.as_str())
        .with_context("arguments", arguments)
        .with_context("locations", code.locations(ReferenceKind::Function, function));
        out.push(finding(CheckCategory::MissingFunction, function, item));
    }
}

fn relation_subject(relation: &Relation) -> String {
    relation.constraint_name.clone().unwrap_or_else(|| {
        format!(
            "{}.{}->{}.{}",
            relation.source_table, relation.source_column, relation.target_table, relation.target_column
        )
    })
}

fn broken_relations(metadata: &DatabaseMetadata, out: &mut Vec<Finding>) {
    for relation in &metadata.relations {
        let mut absent = Vec::new();
        if !metadata.has_table(&relation.source_table) {
            absent.push(relation.source_table.as_str());
        }
        if !relation.targets_other_schema() && !metadata.has_table(&relation.target_table) {
            absent.push(relation.target_table.as_str());
        }
        if absent.is_empty() {
            continue;
        }
        let subject = relation_subject(relation);
        let item = ReportItem::error(format!(
            "Foreign key {}.{} -> {}.{} points at a missing table",
            relation.source_table, relation.source_column, relation.target_table, relation.target_column
        ))
        .with_detail(format!("missing: {}", absent.join(", ")))
        .with_context("relation", subject.as_str())
        .with_context("missingTables", absent);
        out.push(finding(CheckCategory::BrokenRelation, &subject, item));
    }
}

fn argument_mismatches(metadata: &DatabaseMetadata, code: &CodeScanResult, out: &mut Vec<Finding>) {
    for (function, code_args) in &code.rpc_arguments {
        let Some(signature) = metadata.function_signatures.get(function) else {
            continue;
        };
        let diff = compare_arguments(code_args, signature);
        if diff.is_empty() {
            continue;
        }

        let mut parts = Vec::new();
        if !diff.missing.is_empty() {
            parts.push(format!("missing: {}", diff.missing.join(", ")));
        }
        if !diff.extra.is_empty() {
            parts.push(format!("unexpected: {}", diff.extra.join(", ")));
        }
        let item = ReportItem::warn(format!(
            "Arguments passed to \"{function}\" do not match its signature"
        ))
        .with_detail(parts.join("; "))
        .with_context("function", function.as_str())
        .with_context("missing", diff.missing)
        .with_context("extra", diff.extra)
        .with_context("locations", code.locations(ReferenceKind::Function, function));
        out.push(finding(CheckCategory::RpcArgumentMismatch, function, item));
    }
}

fn rls_gaps(metadata: &DatabaseMetadata, out: &mut Vec<Finding>) {
    for (table, state) in metadata.rls.iter().filter(|(t, _)| metadata.has_table(t)) {
        let item = if !state.enabled {
            ReportItem::warn(format!("Row level security is disabled on \"{table}\""))
                .with_fix(FixType::EnableRls, table.as_str())
        } else if state.policies.is_empty() {
            ReportItem::warn(format!(
                "Row level security is enabled on \"{table}\" but it has no policies"
            ))
            .with_detail("every non-owner query will return no rows")
            .with_fix(FixType::AddRlsPolicy, table.as_str())
        } else {
            continue;
        };
        out.push(finding(
            CheckCategory::RlsGap,
            table,
            item.with_context("table", table.as_str()),
        ));
    }
}

fn missing_columns(metadata: &DatabaseMetadata, code: &CodeScanResult, out: &mut Vec<Finding>) {
    for (table, columns) in &code.columns {
        if !metadata.has_table(table) || metadata.columns_of(table).is_empty() {
            continue;
        }
        for column in columns.iter().filter(|c| !metadata.has_column(table, c)) {
            let subject = format!("{table}.{column}");
            let item = ReportItem::warn(format!(
                "Column \"{column}\" is used in code but does not exist on \"{table}\""
            ))
            .with_fix(FixType::AddColumn, subject.as_str())
            .with_context("table", table.as_str())
            .with_context("column", column.as_str())
            .with_context("locations", code.locations(ReferenceKind::Column, &subject));
            out.push(finding(CheckCategory::MissingColumn, &subject, item));
        }
    }
}

fn unindexed_foreign_keys(metadata: &DatabaseMetadata, out: &mut Vec<Finding>) {
    for relation in &metadata.relations {
        if !metadata.has_table(&relation.source_table) {
            continue;
        }
        if metadata.is_indexed(&relation.source_table, &relation.source_column) != Some(false) {
            continue;
        }
        let subject = format!("{}.{}", relation.source_table, relation.source_column);
        let item = ReportItem::warn(format!(
            "Foreign key column \"{subject}\" has no index"
        ))
        .with_detail(format!("references {}.{}", relation.target_table, relation.target_column))
        .with_fix(FixType::CreateIndex, subject.as_str())
        .with_context("table", relation.source_table.as_str())
        .with_context("column", relation.source_column.as_str());
        out.push(finding(CheckCategory::UnindexedForeignKey, &subject, item));
    }
}
