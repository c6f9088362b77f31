//! Consistency analyzer: mismatches between schema and code.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use schemaguard_analysis::consistency::{compare_arguments, CallMode};
use schemaguard_analysis::{analyze, analyze_with};
use schemaguard_core::types::code::CodeScanResult;
use schemaguard_core::types::fix::FixType;
use schemaguard_core::types::report::{CheckCategory, Finding, Status, Summary};
use schemaguard_core::types::schema::{
    ColumnInfo, DatabaseMetadata, FunctionArgument, FunctionSignature, IndexInfo, Relation,
    RlsState, TablePolicy,
};

// ---- Helpers ----

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn metadata(tables: &[&str], functions: &[&str]) -> DatabaseMetadata {
    DatabaseMetadata {
        schema: "public".into(),
        tables: set(tables),
        functions: set(functions),
        ..Default::default()
    }
}

fn code(tables: &[&str], functions: &[&str]) -> CodeScanResult {
    CodeScanResult {
        tables: set(tables),
        functions: set(functions),
        ..Default::default()
    }
}

fn arg(name: &str, optional: bool) -> FunctionArgument {
    FunctionArgument {
        name: name.into(),
        data_type: Some("text".into()),
        optional,
    }
}

fn signature(name: &str, args: Vec<FunctionArgument>) -> FunctionSignature {
    FunctionSignature {
        name: name.into(),
        arguments: args,
        return_type: Some("jsonb".into()),
    }
}

fn column(name: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.into(),
        data_type: "text".into(),
        nullable: true,
        default: None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn of_check(findings: &[Finding], check: CheckCategory) -> Vec<&Finding> {
    findings.iter().filter(|f| f.check == check).collect()
}

// ---- End-to-end scenario ----

#[test]
fn missing_table_and_function_scenario() {
    let db = metadata(&["users"], &[]);
    let mut scan = code(&["users", "orders"], &["get_total"]);
    scan.rpc_arguments
        .insert("get_total".into(), strings(&["user_id"]));

    let findings = analyze(&db, &scan);
    assert_eq!(findings.len(), 2);

    assert_eq!(findings[0].check, CheckCategory::MissingTable);
    assert_eq!(findings[0].subject, "orders");
    assert_eq!(findings[0].item.status, Status::Error);
    let fix = findings[0].item.suggested_fix.as_ref().unwrap();
    assert_eq!(fix.fix_type, FixType::CreateTable);
    assert_eq!(fix.target, "orders");

    assert_eq!(findings[1].check, CheckCategory::MissingFunction);
    assert_eq!(findings[1].subject, "get_total");
    assert_eq!(
        findings[1].item.suggested_fix.as_ref().unwrap().fix_type,
        FixType::CreateFunction
    );
    assert_eq!(findings[1].item.context_strings("arguments"), vec!["user_id"]);

    let summary = Summary::from_findings(findings.iter().map(|f| &f.item));
    assert_eq!(
        summary,
        Summary {
            total: 2,
            errors: 2,
            warnings: 0,
            ok: 0
        }
    );
}

// ---- Symmetry ----

#[test]
fn db_only_tables_produce_nothing() {
    let db = metadata(&["users", "legacy_audit"], &["cleanup"]);
    let scan = code(&["users"], &[]);
    assert!(analyze(&db, &scan).is_empty());
}

#[test]
fn findings_are_ordered_by_check_then_subject() {
    let db = metadata(&[], &[]);
    let scan = code(&["zebra", "apple", "mango"], &["b_fn", "a_fn"]);
    let findings = analyze(&db, &scan);
    let subjects: Vec<&str> = findings
        .iter()
        .map(|f| f.subject.as_str())
        .collect();
    assert_eq!(subjects, vec!["apple", "mango", "zebra", "a_fn", "b_fn"]);
}

// ---- RPC arguments ----

#[test]
fn omitted_optional_argument_is_tolerated() {
    let mut db = metadata(&[], &["search"]);
    db.function_signatures.insert(
        "search".into(),
        signature("search", vec![arg("query", false), arg("x", true)]),
    );
    let mut scan = code(&[], &["search"]);
    scan.rpc_arguments.insert("search".into(), strings(&["query"]));

    assert!(analyze(&db, &scan).is_empty());
}

#[test]
fn omitted_required_argument_is_a_warning() {
    let mut db = metadata(&[], &["search"]);
    db.function_signatures
        .insert("search".into(), signature("search", vec![arg("x", false)]));
    let mut scan = code(&[], &["search"]);
    scan.rpc_arguments.insert("search".into(), vec![]);

    let findings = analyze(&db, &scan);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, CheckCategory::RpcArgumentMismatch);
    assert_eq!(findings[0].item.status, Status::Warn);
    assert_eq!(findings[0].item.context_strings("missing"), vec!["x"]);
    assert!(findings[0].item.suggested_fix.is_none());
}

#[test]
fn unexpected_named_argument_is_reported() {
    let sig = signature("f", vec![arg("a", false)]);
    let diff = compare_arguments(&strings(&["a", "b"]), &sig);
    assert!(diff.missing.is_empty());
    assert_eq!(diff.extra, vec!["b"]);
}

#[test]
fn positional_calls_compare_by_arity() {
    let sig = signature("f", vec![arg("a", false), arg("b", false), arg("c", true)]);
    assert_eq!(CallMode::of(&strings(&["$1", "$2"])), CallMode::Positional(2));
    assert_eq!(CallMode::of(&strings(&["$1", "name"])), CallMode::Named);
    assert_eq!(CallMode::of(&[]), CallMode::Named);

    assert!(compare_arguments(&strings(&["$1", "$2"]), &sig).is_empty());
    assert!(compare_arguments(&strings(&["$1", "$2", "$3"]), &sig).is_empty());

    let short = compare_arguments(&strings(&["$1"]), &sig);
    assert_eq!(short.missing, vec!["b"]);
    assert!(short.extra.is_empty());

    let long = compare_arguments(&strings(&["$1", "$2", "$3", "$4", "$5"]), &sig);
    assert!(long.missing.is_empty());
    assert_eq!(long.extra, vec!["$4", "$5"]);
}

#[test]
fn unknown_signature_skips_argument_check() {
    let db = metadata(&[], &["f"]);
    let mut scan = code(&[], &["f"]);
    scan.rpc_arguments.insert("f".into(), strings(&["anything"]));
    assert!(analyze(&db, &scan).is_empty());
}

// ---- Relations ----

#[test]
fn broken_relation_names_missing_tables() {
    let mut db = metadata(&["orders", "profiles"], &[]);
    db.relations = vec![
        Relation {
            constraint_name: Some("orders_customer_id_fkey".into()),
            source_table: "orders".into(),
            source_column: "customer_id".into(),
            target_table: "customers".into(),
            target_column: "id".into(),
        },
        Relation {
            constraint_name: None,
            source_table: "profiles".into(),
            source_column: "id".into(),
            target_table: "auth.users".into(),
            target_column: "id".into(),
        },
    ];
    let findings = analyze(&db, &CodeScanResult::default());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, CheckCategory::BrokenRelation);
    assert_eq!(findings[0].subject, "orders_customer_id_fkey");
    assert_eq!(findings[0].item.status, Status::Error);
    assert_eq!(
        findings[0].item.context_strings("missingTables"),
        vec!["customers"]
    );
}

#[test]
fn unindexed_foreign_key_only_when_indexes_known() {
    let mut db = metadata(&["orders", "users"], &[]);
    db.relations = vec![Relation {
        constraint_name: None,
        source_table: "orders".into(),
        source_column: "user_id".into(),
        target_table: "users".into(),
        target_column: "id".into(),
    }];
    assert!(analyze(&db, &CodeScanResult::default()).is_empty());

    db.indexes = Some(BTreeMap::new());
    let findings = analyze(&db, &CodeScanResult::default());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, CheckCategory::UnindexedForeignKey);
    assert_eq!(findings[0].subject, "orders.user_id");

    db.indexes = Some(BTreeMap::from([(
        "orders".to_string(),
        vec![IndexInfo {
            name: "orders_user_id_idx".into(),
            leading_column: "user_id".into(),
        }],
    )]));
    assert!(analyze(&db, &CodeScanResult::default()).is_empty());
}

// ---- RLS ----

#[test]
fn rls_gaps_distinguish_disabled_from_policyless() {
    let mut db = metadata(&["a", "b", "c"], &[]);
    db.rls.insert("a".into(), RlsState::default());
    db.rls.insert(
        "b".into(),
        RlsState {
            enabled: true,
            policies: vec![],
        },
    );
    db.rls.insert(
        "c".into(),
        RlsState {
            enabled: true,
            policies: vec![TablePolicy {
                name: "read".into(),
                action: "SELECT".into(),
                roles: vec!["authenticated".into()],
                using: Some("true".into()),
                check: None,
            }],
        },
    );

    let findings = analyze(&db, &CodeScanResult::default());
    let gaps = of_check(&findings, CheckCategory::RlsGap);
    assert_eq!(gaps.len(), 2);
    assert_eq!(gaps[0].subject, "a");
    assert_eq!(
        gaps[0].item.suggested_fix.as_ref().unwrap().fix_type,
        FixType::EnableRls
    );
    assert_eq!(gaps[1].subject, "b");
    assert_eq!(
        gaps[1].item.suggested_fix.as_ref().unwrap().fix_type,
        FixType::AddRlsPolicy
    );

    let without_rls = analyze_with(
        &db,
        &CodeScanResult::default(),
        &[CheckCategory::MissingTable, CheckCategory::MissingFunction],
    );
    assert!(without_rls.is_empty());
}

// ---- Columns ----

#[test]
fn missing_column_needs_a_known_column_list() {
    let mut db = metadata(&["users", "orders"], &[]);
    db.columns
        .insert("users".into(), vec![column("id"), column("email")]);
    let mut scan = code(&["users", "orders"], &[]);
    scan.columns.insert("users".into(), set(&["id", "nickname"]));
    scan.columns.insert("orders".into(), set(&["total"]));

    let findings = analyze(&db, &scan);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, CheckCategory::MissingColumn);
    assert_eq!(findings[0].subject, "users.nickname");
    assert_eq!(findings[0].item.status, Status::Warn);
    assert_eq!(findings[0].item.context_str("column"), Some("nickname"));
}

// ---- Properties ----

fn name_set() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("[a-z]{1,6}", 0..8)
}

proptest! {
    #[test]
    fn analysis_is_idempotent(db_tables in name_set(), code_tables in name_set(), fns in name_set()) {
        let db = DatabaseMetadata { tables: db_tables, ..Default::default() };
        let scan = CodeScanResult { tables: code_tables, functions: fns, ..Default::default() };
        let first = serde_json::to_string(&analyze(&db, &scan)).unwrap();
        let second = serde_json::to_string(&analyze(&db, &scan)).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn one_error_per_code_only_table(db_tables in name_set(), code_tables in name_set()) {
        let db = DatabaseMetadata { tables: db_tables.clone(), ..Default::default() };
        let scan = CodeScanResult { tables: code_tables.clone(), ..Default::default() };
        let findings = analyze(&db, &scan);

        let missing: Vec<&str> = findings
            .iter()
            .filter(|f| f.check == CheckCategory::MissingTable)
            .map(|f| f.subject.as_str())
            .collect();
        let expected: Vec<&str> = code_tables.difference(&db_tables).map(String::as_str).collect();
        prop_assert_eq!(missing, expected);
        prop_assert!(findings.iter().all(|f| f.item.status == Status::Error));
    }
}
