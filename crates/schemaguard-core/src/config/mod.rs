//! Audit configuration.
//!
//! One typed struct per concern, plus a single opaque `extra` map owned by
//! the database provider for forward-compatible settings.

pub mod fix_config;
pub mod scan_config;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use fix_config::FixConfig;
pub use scan_config::ScanConfig;

use crate::errors::ValidationError;

/// Default audit layers, in run order.
pub const DEFAULT_LAYERS: &[&str] = &["schema", "rls", "consistency"];

/// Default per-operation network timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;

/// Database provider backing the `DatabaseScanner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Supabase,
    Postgres,
    Custom,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Supabase => "supabase",
            Provider::Postgres => "postgres",
            Provider::Custom => "custom",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which finding status makes the invocation signal failure to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    Warn,
    #[default]
    Error,
    Never,
}

/// Connection credentials for the target database.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Project URL (supabase) or connection string (postgres).
    pub url: Option<String>,
    /// Anon/public API key (supabase).
    pub key: Option<String>,
    /// Service-role key, needed for RLS introspection and fix execution on supabase.
    #[serde(alias = "serviceRoleKey")]
    pub service_role_key: Option<String>,
    /// Schema to audit.
    pub schema: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            service_role_key: None,
            schema: "public".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url.as_deref().map(redact_url))
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("schema", &self.schema)
            .finish()
    }
}

/// Strip userinfo from a URL so passwords never reach logs.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://[REDACTED]@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// Options accepted by `run_audit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    /// Source tree to scan. Defaults to the current working directory.
    #[serde(alias = "sourceRoot")]
    pub source_root: Option<PathBuf>,
    pub provider: Provider,
    pub connection: ConnectionConfig,
    /// Layer ids, in run order.
    pub layers: Vec<String>,
    /// Where the host wants the JSON report written, if anywhere.
    #[serde(alias = "outputPath")]
    pub output_path: Option<PathBuf>,
    /// Free-form project label copied into the report.
    #[serde(alias = "projectRef")]
    pub project_ref: Option<String>,
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(alias = "failOn")]
    pub fail_on: FailOn,
    pub scan: ScanConfig,
    pub fix: FixConfig,
    /// Provider-owned settings. Opaque to the engine.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            source_root: None,
            provider: Provider::default(),
            connection: ConnectionConfig::default(),
            layers: DEFAULT_LAYERS.iter().map(|s| s.to_string()).collect(),
            output_path: None,
            project_ref: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fail_on: FailOn::default(),
            scan: ScanConfig::default(),
            fix: FixConfig::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl AuditOptions {
    /// Load options from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, ValidationError> {
        toml::from_str(toml_str).map_err(|e| ValidationError::new("config", e.to_string()))
    }

    /// Load options from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::new("config", format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Reads a string setting from the provider-owned `extra` map.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Check everything that can be checked without touching the network or disk.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::new("timeout_ms", "must be greater than zero"));
        }

        if self.layers.is_empty() {
            return Err(ValidationError::new("layers", "at least one layer is required"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.as_str()) {
                return Err(ValidationError::new(
                    "layers",
                    format!("layer `{layer}` listed more than once"),
                ));
            }
        }

        if self.connection.schema.trim().is_empty() {
            return Err(ValidationError::new("connection.schema", "must not be empty"));
        }

        match self.provider {
            Provider::Supabase => {
                let url = self.required_url()?;
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(ValidationError::new(
                        "connection.url",
                        "supabase url must start with http:// or https://",
                    ));
                }
                if self.connection.key.as_deref().map_or(true, str::is_empty) {
                    return Err(ValidationError::new(
                        "connection.key",
                        "supabase provider requires an API key",
                    ));
                }
            }
            Provider::Postgres => {
                let url = self.required_url()?;
                if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                    return Err(ValidationError::new(
                        "connection.url",
                        "postgres url must start with postgres:// or postgresql://",
                    ));
                }
            }
            Provider::Custom => {}
        }

        Ok(())
    }

    fn required_url(&self) -> Result<&str, ValidationError> {
        match self.connection.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ValidationError::new(
                "connection.url",
                format!("{} provider requires a connection url", self.provider),
            )),
        }
    }
}
