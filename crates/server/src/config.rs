//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_TIMER_SYNC_SECS: u64 = 5;

/// Listen address, timer reconciliation period and optional seed data.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// How often running timers are re-broadcast.
    pub timer_sync: Duration,
    /// JSON file of orders to preload into the floor model.
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            timer_sync: Duration::from_secs(DEFAULT_TIMER_SYNC_SECS),
            seed_file: None,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TRACKMINT_BIND`: listen address (default: "0.0.0.0:8000")
    /// - `TRACKMINT_TIMER_SYNC_SECS`: timer re-broadcast period, 0 disables it (default: 5)
    /// - `TRACKMINT_SEED_FILE`: `{"workOrders": [...], "manufacturingOrders": [...]}` to preload
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("TRACKMINT_BIND") {
            match raw.trim().parse::<SocketAddr>() {
                Ok(addr) => config.bind = addr,
                Err(_) => tracing::warn!("Ignoring invalid TRACKMINT_BIND={:?}, using {}", raw, DEFAULT_BIND),
            }
        }

        if let Some(raw) = lookup("TRACKMINT_TIMER_SYNC_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.timer_sync = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring invalid TRACKMINT_TIMER_SYNC_SECS={:?}", raw),
            }
        }

        config.seed_file = lookup("TRACKMINT_SEED_FILE")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        config
    }
}
