//! Schema extraction from the PostgREST OpenAPI document served at `/rest/v1/`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use schemaguard_core::errors::{ScannerError, ScannerResult};
use schemaguard_core::types::schema::{
    ColumnInfo, DatabaseMetadata, FunctionArgument, FunctionSignature, Relation, RlsState,
    TablePolicy,
};
use serde_json::{Map, Value};

/// PostgREST marks foreign keys in column descriptions.
static FK_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<fk table='([^']+)' column='([^']+)'/>").expect("fk marker regex is valid")
});

const RPC_PREFIX: &str = "/rpc/";

/// Build a metadata snapshot from an OpenAPI document.
///
/// RLS state and indexes are not exposed by PostgREST: `rls` stays empty
/// and `indexes` is `None`.
pub fn parse_openapi(doc: &Value, schema: &str) -> ScannerResult<DatabaseMetadata> {
    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| ScannerError::introspection("OpenAPI document has no `paths`"))?;
    let empty = Map::new();
    let definitions = doc
        .get("definitions")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut metadata = DatabaseMetadata {
        schema: schema.to_string(),
        ..Default::default()
    };

    for (name, definition) in definitions {
        if !paths.contains_key(&format!("/{name}")) {
            continue;
        }
        metadata.tables.insert(name.clone());
        let (columns, relations) = parse_definition(name, definition);
        metadata.columns.insert(name.clone(), columns);
        metadata.relations.extend(relations);
    }

    for (path, item) in paths {
        let Some(function) = path.strip_prefix(RPC_PREFIX) else {
            continue;
        };
        metadata.functions.insert(function.to_string());
        metadata
            .function_signatures
            .insert(function.to_string(), parse_rpc(function, item));
    }

    Ok(metadata)
}

fn required_set(schema: &Value) -> BTreeSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn property_type(property: &Value) -> String {
    property
        .get("format")
        .or_else(|| property.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn parse_definition(table: &str, definition: &Value) -> (Vec<ColumnInfo>, Vec<Relation>) {
    let required = required_set(definition);
    let mut columns = Vec::new();
    let mut relations = Vec::new();
    let Some(properties) = definition.get("properties").and_then(Value::as_object) else {
        return (columns, relations);
    };

    for (name, property) in properties {
        columns.push(ColumnInfo {
            name: name.clone(),
            data_type: property_type(property),
            nullable: !required.contains(name),
            default: property.get("default").map(|d| match d {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        });

        let description = property
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        if let Some(caps) = FK_MARKER.captures(description) {
            relations.push(Relation {
                constraint_name: None,
                source_table: table.to_string(),
                source_column: name.clone(),
                target_table: caps[1].to_string(),
                target_column: caps[2].to_string(),
            });
        }
    }
    (columns, relations)
}

/// Arguments of an RPC: POST body schema, or GET query parameters.
fn parse_rpc(function: &str, item: &Value) -> FunctionSignature {
    let mut arguments = Vec::new();

    let body_schema = item
        .pointer("/post/parameters")
        .and_then(Value::as_array)
        .and_then(|params| {
            params
                .iter()
                .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
        })
        .and_then(|p| p.get("schema"));

    if let Some(schema) = body_schema {
        let required = required_set(schema);
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                arguments.push(FunctionArgument {
                    name: name.clone(),
                    data_type: Some(property_type(property)),
                    optional: !required.contains(name),
                });
            }
        }
    } else if let Some(params) = item.pointer("/get/parameters").and_then(Value::as_array) {
        for param in params {
            if param.get("in").and_then(Value::as_str) != Some("query") {
                continue;
            }
            let Some(name) = param.get("name").and_then(Value::as_str) else {
                continue;
            };
            arguments.push(FunctionArgument {
                name: name.to_string(),
                data_type: Some(property_type(param)),
                optional: !param.get("required").and_then(Value::as_bool).unwrap_or(false),
            });
        }
    }

    FunctionSignature {
        name: function.to_string(),
        arguments,
        return_type: None,
    }
}

/// SQL sent through the SQL-helper RPC to read RLS state.
/// The helper must return the statement's single `jsonb` value.
pub fn rls_query(schema: &str, tables: &[String]) -> String {
    let quote = |s: &str| format!("'{}'", s.replace('\'', "''"));
    let names: Vec<String> = tables.iter().map(|t| quote(t)).collect();
    let filter = if names.is_empty() {
        "false".to_string()
    } else {
        format!("c.relname IN ({})", names.join(", "))
    };
    format!(
        "SELECT coalesce(jsonb_agg(t), '[]'::jsonb) FROM (\
         SELECT c.relname AS table_name, c.relrowsecurity AS enabled, \
         coalesce((SELECT jsonb_agg(jsonb_build_object(\
         'name', p.policyname, 'action', p.cmd, 'roles', p.roles, \
         'using', p.qual, 'check', p.with_check)) \
         FROM pg_policies p WHERE p.schemaname = n.nspname AND p.tablename = c.relname), \
         '[]'::jsonb) AS policies \
         FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = {} AND c.relkind IN ('r', 'p') AND {filter}) t",
        quote(schema)
    )
}

/// Parse the helper's response to [`rls_query`].
///
/// Accepts the row array directly or wrapped in a single-value object or
/// single-element array, which is how different helper definitions return it.
pub fn parse_rls_rows(value: &Value) -> ScannerResult<BTreeMap<String, RlsState>> {
    let rows = unwrap_rows(value)
        .ok_or_else(|| ScannerError::introspection("unexpected RLS response shape"))?;

    let mut states = BTreeMap::new();
    for row in rows {
        let table = row
            .get("table_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ScannerError::introspection("RLS row without table_name"))?;
        let policies = row
            .get("policies")
            .and_then(Value::as_array)
            .map(|ps| ps.iter().filter_map(parse_policy).collect())
            .unwrap_or_default();
        states.insert(
            table.to_string(),
            RlsState {
                enabled: row.get("enabled").and_then(Value::as_bool).unwrap_or(false),
                policies,
            },
        );
    }
    Ok(states)
}

fn unwrap_rows(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) if items.iter().all(|i| i.get("table_name").is_some()) => Some(items),
        Value::Array(items) if items.len() == 1 => unwrap_rows(&items[0]),
        Value::Object(map) if map.len() == 1 => map.values().next().and_then(unwrap_rows),
        _ => None,
    }
}

fn parse_policy(value: &Value) -> Option<TablePolicy> {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    Some(TablePolicy {
        name: text("name")?,
        action: text("action").unwrap_or_else(|| "ALL".to_string()),
        roles: value
            .get("roles")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        using: text("using"),
        check: text("check"),
    })
}
