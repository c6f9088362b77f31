//! Direct Postgres provider over a single-connection `sqlx` pool.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use schemaguard_core::config::{redact_url, ConnectionConfig};
use schemaguard_core::errors::{ScannerError, ScannerResult};
use schemaguard_core::types::code::positional_name;
use schemaguard_core::types::schema::{
    ColumnInfo, DatabaseMetadata, FunctionArgument, FunctionSignature, IndexInfo, Relation,
    RlsState, TablePolicy,
};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use crate::factory::ScannerSettings;
use crate::timeout::bounded;
use crate::traits::DatabaseScanner;

const TABLES_QUERY: &str = r"
    SELECT table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
";

const COLUMNS_QUERY: &str = r"
    SELECT
        table_name::text AS table_name,
        column_name::text AS column_name,
        data_type::text AS data_type,
        is_nullable = 'YES' AS nullable,
        column_default::text AS column_default
    FROM information_schema.columns
    WHERE table_schema = $1
    ORDER BY table_name, ordinal_position
";

// pg_constraint rather than information_schema: the latter hides targets
// owned by other roles, such as auth.users.
const RELATIONS_QUERY: &str = r"
    SELECT
        con.conname::text AS constraint_name,
        src.relname::text AS source_table,
        sa.attname::text AS source_column,
        CASE WHEN tn.nspname = $1 THEN tgt.relname::text
             ELSE tn.nspname || '.' || tgt.relname END AS target_table,
        ta.attname::text AS target_column
    FROM pg_constraint con
    JOIN pg_class src ON src.oid = con.conrelid
    JOIN pg_namespace sn ON sn.oid = src.relnamespace
    JOIN pg_class tgt ON tgt.oid = con.confrelid
    JOIN pg_namespace tn ON tn.oid = tgt.relnamespace
    JOIN pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = con.conkey[1]
    JOIN pg_attribute ta ON ta.attrelid = con.confrelid AND ta.attnum = con.confkey[1]
    WHERE con.contype = 'f' AND sn.nspname = $1
    ORDER BY source_table, constraint_name
";

const FUNCTIONS_QUERY: &str = r"
    SELECT
        p.proname::text AS name,
        COALESCE(p.proargnames, ARRAY[]::text[]) AS arg_names,
        COALESCE(p.proargmodes::text[], ARRAY[]::text[]) AS arg_modes,
        ARRAY(
            SELECT format_type(t.oid, NULL)
            FROM unnest(p.proargtypes::oid[]) WITH ORDINALITY AS t(oid, ord)
            ORDER BY t.ord
        ) AS in_types,
        p.pronargdefaults::int4 AS n_defaults,
        pg_get_function_result(p.oid) AS return_type
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname = $1 AND p.prokind = 'f'
    ORDER BY p.proname, p.oid
";

const RLS_QUERY: &str = r"
    SELECT c.relname::text AS table_name, c.relrowsecurity AS enabled
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') AND c.relname = ANY($2)
";

const POLICIES_QUERY: &str = r"
    SELECT
        tablename::text AS table_name,
        policyname::text AS policy_name,
        cmd::text AS action,
        roles::text[] AS roles,
        qual::text AS using_expr,
        with_check::text AS check_expr
    FROM pg_policies
    WHERE schemaname = $1 AND tablename = ANY($2)
    ORDER BY tablename, policyname
";

const INDEXES_QUERY: &str = r"
    SELECT
        t.relname::text AS table_name,
        i.relname::text AS index_name,
        a.attname::text AS leading_column
    FROM pg_index x
    JOIN pg_class t ON t.oid = x.indrelid
    JOIN pg_class i ON i.oid = x.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = x.indkey[0]
    WHERE n.nspname = $1
    ORDER BY table_name, index_name
";

/// Postgres provider. Holds at most one pooled connection.
pub struct PostgresScanner {
    settings: ScannerSettings,
    pool: Option<PgPool>,
}

impl PostgresScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            settings,
            pool: None,
        }
    }

    fn pool(&self) -> ScannerResult<&PgPool> {
        self.pool.as_ref().ok_or(ScannerError::NotConnected)
    }

    async fn snapshot(&self) -> Result<DatabaseMetadata, sqlx::Error> {
        let schema = self.settings.schema.as_str();
        let mut tx = self.pool().map_err(|_| sqlx::Error::PoolClosed)?.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let tables = load_tables(&mut *tx, schema).await?;
        let mut columns = load_columns(&mut *tx, schema).await?;
        columns.retain(|table, _| tables.contains(table));
        let relations = load_relations(&mut *tx, schema).await?;
        let function_signatures = load_functions(&mut *tx, schema).await?;
        let table_list: Vec<String> = tables.iter().cloned().collect();
        let rls = load_rls(&mut *tx, schema, &table_list).await?;
        let indexes = load_indexes(&mut *tx, schema).await?;
        tx.commit().await?;

        Ok(DatabaseMetadata {
            schema: schema.to_string(),
            functions: function_signatures.keys().cloned().collect(),
            tables,
            columns,
            relations,
            function_signatures,
            rls,
            indexes: Some(indexes),
        })
    }
}

#[async_trait]
impl DatabaseScanner for PostgresScanner {
    fn provider(&self) -> &str {
        "postgres"
    }

    #[instrument(skip_all)]
    async fn connect(&mut self, connection: &ConnectionConfig) -> ScannerResult<()> {
        let url = connection
            .url
            .as_deref()
            .ok_or_else(|| ScannerError::connection("no connection url configured"))?;
        let timeout = self.settings.timeout;

        let pool = bounded("connect", timeout, async {
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect(url)
                .await
                .map_err(|e| ScannerError::connection(format!("{}: {e}", redact_url(url))))?;
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(|e| ScannerError::connection(e.to_string()))?;
            Ok(pool)
        })
        .await?;

        self.settings.schema = connection.schema.clone();
        self.pool = Some(pool);
        info!(url = %redact_url(url), schema = %connection.schema, "postgres connected");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn scan_schema(&self) -> ScannerResult<DatabaseMetadata> {
        self.pool()?;
        let metadata = bounded("scan_schema", self.settings.timeout, async {
            self.snapshot()
                .await
                .map_err(|e| ScannerError::introspection(e.to_string()))
        })
        .await?;
        debug!(
            tables = metadata.tables.len(),
            functions = metadata.functions.len(),
            "postgres schema scanned"
        );
        Ok(metadata)
    }

    async fn check_rls(&self, tables: &[String]) -> ScannerResult<BTreeMap<String, RlsState>> {
        let pool = self.pool()?;
        let schema = self.settings.schema.as_str();
        bounded("check_rls", self.settings.timeout, async {
            let mut conn = pool
                .acquire()
                .await
                .map_err(|e| ScannerError::connection(e.to_string()))?;
            load_rls(&mut *conn, schema, tables)
                .await
                .map_err(|e| ScannerError::introspection(e.to_string()))
        })
        .await
    }

    async fn get_columns(&self, table: &str) -> ScannerResult<Vec<ColumnInfo>> {
        let pool = self.pool()?;
        let schema = self.settings.schema.as_str();
        bounded("get_columns", self.settings.timeout, async {
            let mut conn = pool
                .acquire()
                .await
                .map_err(|e| ScannerError::connection(e.to_string()))?;
            let mut all = load_columns(&mut *conn, schema)
                .await
                .map_err(|e| ScannerError::introspection(e.to_string()))?;
            Ok(all.remove(table).unwrap_or_default())
        })
        .await
    }

    async fn get_function_signature(&self, name: &str) -> ScannerResult<Option<FunctionSignature>> {
        let pool = self.pool()?;
        let schema = self.settings.schema.as_str();
        bounded("get_function_signature", self.settings.timeout, async {
            let mut conn = pool
                .acquire()
                .await
                .map_err(|e| ScannerError::connection(e.to_string()))?;
            let mut all = load_functions(&mut *conn, schema)
                .await
                .map_err(|e| ScannerError::introspection(e.to_string()))?;
            Ok(all.remove(name))
        })
        .await
    }

    async fn execute_sql(&mut self, sql: &str) -> ScannerResult<()> {
        let pool = self.pool()?;
        bounded("execute_sql", self.settings.timeout, async {
            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(|e| ScannerError::execution(database_message(e)))
        })
        .await
    }

    async fn is_healthy(&self) -> bool {
        let Ok(pool) = self.pool() else {
            return false;
        };
        bounded("health_check", self.settings.timeout, async {
            sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(|e| ScannerError::connection(e.to_string()))
        })
        .await
        .is_ok()
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!("postgres disconnected");
        }
    }
}

/// The server's own message for database errors, the driver's otherwise.
fn database_message(error: sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

async fn load_tables(conn: &mut PgConnection, schema: &str) -> Result<BTreeSet<String>, sqlx::Error> {
    let rows = sqlx::query(TABLES_QUERY).bind(schema).fetch_all(&mut *conn).await?;
    rows.iter().map(|r| r.try_get::<String, _>("table_name")).collect()
}

async fn load_columns(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<BTreeMap<String, Vec<ColumnInfo>>, sqlx::Error> {
    let rows = sqlx::query(COLUMNS_QUERY).bind(schema).fetch_all(&mut *conn).await?;
    let mut columns: BTreeMap<String, Vec<ColumnInfo>> = BTreeMap::new();
    for row in rows {
        columns
            .entry(row.try_get("table_name")?)
            .or_default()
            .push(ColumnInfo {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                nullable: row.try_get("nullable")?,
                default: row.try_get("column_default")?,
            });
    }
    Ok(columns)
}

async fn load_relations(conn: &mut PgConnection, schema: &str) -> Result<Vec<Relation>, sqlx::Error> {
    let rows = sqlx::query(RELATIONS_QUERY).bind(schema).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| {
            Ok(Relation {
                constraint_name: row.try_get("constraint_name")?,
                source_table: row.try_get("source_table")?,
                source_column: row.try_get("source_column")?,
                target_table: row.try_get("target_table")?,
                target_column: row.try_get("target_column")?,
            })
        })
        .collect()
}

async fn load_functions(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<BTreeMap<String, FunctionSignature>, sqlx::Error> {
    let rows = sqlx::query(FUNCTIONS_QUERY).bind(schema).fetch_all(&mut *conn).await?;
    let mut functions = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("name")?;
        // Overloads: the first (lowest oid) signature wins.
        if functions.contains_key(&name) {
            continue;
        }
        let n_defaults: i32 = row.try_get("n_defaults")?;
        let signature = assemble_signature(
            &name,
            &row.try_get::<Vec<String>, _>("arg_names")?,
            &row.try_get::<Vec<String>, _>("arg_modes")?,
            &row.try_get::<Vec<String>, _>("in_types")?,
            n_defaults.max(0) as usize,
            row.try_get("return_type")?,
        );
        functions.insert(name, signature);
    }
    Ok(functions)
}

async fn load_rls(
    conn: &mut PgConnection,
    schema: &str,
    tables: &[String],
) -> Result<BTreeMap<String, RlsState>, sqlx::Error> {
    let rows = sqlx::query(RLS_QUERY)
        .bind(schema)
        .bind(tables)
        .fetch_all(&mut *conn)
        .await?;
    let mut states = BTreeMap::new();
    for row in rows {
        states.insert(
            row.try_get::<String, _>("table_name")?,
            RlsState {
                enabled: row.try_get("enabled")?,
                policies: Vec::new(),
            },
        );
    }

    let rows = sqlx::query(POLICIES_QUERY)
        .bind(schema)
        .bind(tables)
        .fetch_all(&mut *conn)
        .await?;
    for row in rows {
        let table: String = row.try_get("table_name")?;
        if let Some(state) = states.get_mut(&table) {
            state.policies.push(TablePolicy {
                name: row.try_get("policy_name")?,
                action: row.try_get("action")?,
                roles: row.try_get::<Option<Vec<String>>, _>("roles")?.unwrap_or_default(),
                using: row.try_get("using_expr")?,
                check: row.try_get("check_expr")?,
            });
        }
    }
    Ok(states)
}

async fn load_indexes(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<BTreeMap<String, Vec<IndexInfo>>, sqlx::Error> {
    let rows = sqlx::query(INDEXES_QUERY).bind(schema).fetch_all(&mut *conn).await?;
    let mut indexes: BTreeMap<String, Vec<IndexInfo>> = BTreeMap::new();
    for row in rows {
        indexes
            .entry(row.try_get("table_name")?)
            .or_default()
            .push(IndexInfo {
                name: row.try_get("index_name")?,
                leading_column: row.try_get("leading_column")?,
            });
    }
    Ok(indexes)
}

/// Build a signature from `pg_proc` columns.
///
/// `arg_names` and `arg_modes` cover every argument (including OUT) when
/// modes are present, only inputs otherwise. Unnamed inputs become `$k`.
/// The trailing `n_defaults` inputs are optional.
pub fn assemble_signature(
    name: &str,
    arg_names: &[String],
    arg_modes: &[String],
    in_types: &[String],
    n_defaults: usize,
    return_type: Option<String>,
) -> FunctionSignature {
    let positions = if arg_modes.is_empty() {
        in_types.len()
    } else {
        arg_modes.len()
    };

    let mut arguments = Vec::with_capacity(in_types.len());
    for pos in 0..positions {
        let mode = arg_modes.get(pos).map(String::as_str).unwrap_or("i");
        if !matches!(mode, "i" | "b" | "v") {
            continue;
        }
        let index = arguments.len() + 1;
        let declared = arg_names.get(pos).filter(|n| !n.is_empty());
        arguments.push(FunctionArgument {
            name: declared.cloned().unwrap_or_else(|| positional_name(index)),
            data_type: in_types.get(index - 1).cloned(),
            optional: false,
        });
    }

    let first_optional = arguments.len().saturating_sub(n_defaults);
    for arg in arguments.iter_mut().skip(first_optional) {
        arg.optional = true;
    }

    FunctionSignature {
        name: name.to_string(),
        arguments,
        return_type,
    }
}
