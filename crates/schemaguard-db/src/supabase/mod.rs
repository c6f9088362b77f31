//! Supabase provider: PostgREST over HTTP.
//!
//! Schema comes from the OpenAPI document. RLS state and SQL execution need
//! a SQL-helper RPC (`extra.sqlRpc`, default `exec_sql`, taking
//! `query text` and returning `jsonb`) called with the service-role key.

pub mod openapi;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use schemaguard_core::config::ConnectionConfig;
use schemaguard_core::errors::{ScannerError, ScannerResult};
use schemaguard_core::types::schema::{ColumnInfo, DatabaseMetadata, FunctionSignature, RlsState};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::factory::ScannerSettings;
use crate::timeout::bounded;
use crate::traits::DatabaseScanner;

/// `extra` key naming the SQL-helper RPC.
pub const SQL_RPC_KEY: &str = "sqlRpc";
pub const DEFAULT_SQL_RPC: &str = "exec_sql";

const REST_PATH: &str = "/rest/v1/";

struct Session {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
    service_key: Option<String>,
}

impl Session {
    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let key = self.service_key.as_deref().unwrap_or(&self.api_key);
        self.client
            .get(url)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Accept", "application/openapi+json")
    }
}

pub struct SupabaseScanner {
    settings: ScannerSettings,
    session: Option<Session>,
}

impl SupabaseScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn session(&self) -> ScannerResult<&Session> {
        self.session.as_ref().ok_or(ScannerError::NotConnected)
    }

    fn sql_rpc(&self) -> &str {
        self.settings.extra_str(SQL_RPC_KEY).unwrap_or(DEFAULT_SQL_RPC)
    }

    async fn fetch_openapi(&self) -> ScannerResult<Value> {
        let session = self.session()?;
        let response = session
            .get(&session.rest_url)
            .send()
            .await
            .map_err(|e| ScannerError::introspection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ScannerError::introspection(format!(
                "OpenAPI request returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ScannerError::introspection(format!("invalid OpenAPI document: {e}")))
    }

    /// Run `sql` through the helper RPC with the service-role key.
    async fn call_sql_rpc(&self, sql: &str) -> ScannerResult<Value> {
        let session = self.session()?;
        let Some(service_key) = session.service_key.as_deref() else {
            return Err(ScannerError::Unsupported {
                provider: "supabase".into(),
                operation: "sql execution without a service role key".into(),
            });
        };
        let url = format!("{}rpc/{}", session.rest_url, self.sql_rpc());
        let response = session
            .client
            .post(&url)
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .json(&json!({ "query": sql }))
            .send()
            .await
            .map_err(|e| ScannerError::execution(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("sql helper returned {status}"));
            Err(ScannerError::execution(message))
        }
    }

    async fn metadata(&self) -> ScannerResult<DatabaseMetadata> {
        let doc = self.fetch_openapi().await?;
        openapi::parse_openapi(&doc, &self.settings.schema)
    }
}

#[async_trait]
impl DatabaseScanner for SupabaseScanner {
    fn provider(&self) -> &str {
        "supabase"
    }

    async fn connect(&mut self, connection: &ConnectionConfig) -> ScannerResult<()> {
        let url = connection
            .url
            .as_deref()
            .ok_or_else(|| ScannerError::connection("no project url configured"))?;
        let api_key = connection
            .key
            .clone()
            .ok_or_else(|| ScannerError::connection("no api key configured"))?;

        let client = reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| ScannerError::connection(e.to_string()))?;
        let session = Session {
            client,
            rest_url: format!("{}{REST_PATH}", url.trim_end_matches('/')),
            api_key,
            service_key: connection.service_role_key.clone(),
        };

        let status = bounded("connect", self.settings.timeout, async {
            session
                .get(&session.rest_url)
                .send()
                .await
                .map(|r| r.status())
                .map_err(|e| ScannerError::connection(e.to_string()))
        })
        .await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScannerError::connection(format!("authentication rejected ({status})")));
        }
        if !status.is_success() {
            return Err(ScannerError::connection(format!("unexpected status {status}")));
        }

        self.settings.schema = connection.schema.clone();
        self.session = Some(session);
        info!(url, "supabase connected");
        Ok(())
    }

    async fn scan_schema(&self) -> ScannerResult<DatabaseMetadata> {
        let metadata = bounded("scan_schema", self.settings.timeout, self.metadata()).await?;
        debug!(
            tables = metadata.tables.len(),
            functions = metadata.functions.len(),
            "supabase schema scanned"
        );
        Ok(metadata)
    }

    async fn check_rls(&self, tables: &[String]) -> ScannerResult<BTreeMap<String, RlsState>> {
        let sql = openapi::rls_query(&self.settings.schema, tables);
        let response = bounded("check_rls", self.settings.timeout, self.call_sql_rpc(&sql))
            .await
            .map_err(|e| match e {
                ScannerError::Timeout { .. } => e,
                other => ScannerError::introspection(other.to_string()),
            })?;
        openapi::parse_rls_rows(&response)
    }

    async fn get_columns(&self, table: &str) -> ScannerResult<Vec<ColumnInfo>> {
        let mut metadata = bounded("get_columns", self.settings.timeout, self.metadata()).await?;
        Ok(metadata.columns.remove(table).unwrap_or_default())
    }

    async fn get_function_signature(&self, name: &str) -> ScannerResult<Option<FunctionSignature>> {
        let mut metadata =
            bounded("get_function_signature", self.settings.timeout, self.metadata()).await?;
        Ok(metadata.function_signatures.remove(name))
    }

    async fn execute_sql(&mut self, sql: &str) -> ScannerResult<()> {
        bounded("execute_sql", self.settings.timeout, self.call_sql_rpc(sql))
            .await
            .map(|_| ())
    }

    async fn is_healthy(&self) -> bool {
        let Ok(session) = self.session() else {
            return false;
        };
        session
            .get(&session.rest_url)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn disconnect(&mut self) {
        if self.session.take().is_some() {
            info!("supabase disconnected");
        }
    }
}
