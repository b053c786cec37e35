//! Client configuration from environment variables.

use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Endpoints and connection tuning for the live-update client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Live-update WebSocket endpoint.
    pub ws_url: String,
    /// Base URL of the REST API.
    pub api_url: String,
    /// Bearer token for the REST API, if any.
    pub api_token: Option<String>,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Build configuration from the environment.
    ///
    /// Environment variables:
    /// - `TRACKMINT_WS_URL`: live-update endpoint (default: "ws://localhost:8000/ws")
    /// - `TRACKMINT_API_URL`: REST base URL (default: "http://localhost:8000/api")
    /// - `TRACKMINT_API_TOKEN`: bearer token (default: none)
    /// - `TRACKMINT_RECONNECT_MAX_ATTEMPTS`: 0 retries forever (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = endpoint(&lookup, "TRACKMINT_WS_URL", &["ws", "wss"]) {
            config.ws_url = url;
        }
        if let Some(url) = endpoint(&lookup, "TRACKMINT_API_URL", &["http", "https"]) {
            config.api_url = url;
        }
        config.api_token = lookup("TRACKMINT_API_TOKEN").filter(|v| !v.trim().is_empty());

        if let Some(raw) = lookup("TRACKMINT_RECONNECT_MAX_ATTEMPTS") {
            match raw.trim().parse::<u32>() {
                Ok(n) => config.reconnect.max_attempts = n,
                Err(_) => tracing::warn!("Ignoring invalid TRACKMINT_RECONNECT_MAX_ATTEMPTS={:?}", raw),
            }
        }

        config
    }
}

/// Read a URL variable, ignoring blanks and URLs with an unexpected scheme.
fn endpoint(lookup: &impl Fn(&str) -> Option<String>, key: &str, schemes: &[&str]) -> Option<String> {
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) if schemes.contains(&url.scheme()) => Some(raw.to_string()),
        Ok(url) => {
            tracing::warn!("Ignoring {}: unsupported scheme {:?}", key, url.scheme());
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
            None
        }
    }
}
