//! Tracing bootstrap.
//!
//! The engine only emits `tracing` events. Hosts that want them on stderr
//! call [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter.
pub const LOG_ENV_VAR: &str = "SCHEMAGUARD_LOG";

const DEFAULT_FILTER: &str = "schemaguard=info";

/// Install a formatted subscriber. Safe to call more than once; later calls are no-ops.
///
/// Filter precedence: `SCHEMAGUARD_LOG`, then `filter`, then `schemaguard=info`.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
