//! Live-update transport contract and connection state.
//!
//! This module provides the shared types and the native WebSocket
//! implementation of [`Transport`].

use trackmint_shared::ClientCommand;

/// Connection state for a WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    /// Whether the given failed attempt was the last one allowed
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Events a transport reports to whoever drives the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket is open and ready to send.
    Open,
    /// The socket closed (cleanly or because the peer went away).
    Close,
    /// The socket failed; carries a human-readable reason.
    Error(String),
    /// A text frame arrived.
    Message(String),
}

/// Duplex live-update channel consumed by the coordinator.
///
/// Implementations are cheap handles onto one shared connection; the
/// application shell owns `connect`/`disconnect`. `send` is fire-and-forget:
/// what happens to a command sent while closed is up to the implementation.
pub trait Transport {
    fn is_connected(&self) -> bool;
    fn send(&self, command: &ClientCommand);
    fn connect(&self);
    fn disconnect(&self);
}

mod connection_native;
pub use connection_native::WsTransport;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 1500);
        assert_eq!(config.delay_for_attempt(2), 2250);
        assert_eq!(config.delay_for_attempt(20), 30000);
    }

    #[test]
    fn zero_max_attempts_never_exhausts() {
        let forever = ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!forever.exhausted(1_000));

        let bounded = ReconnectConfig::default();
        assert!(!bounded.exhausted(9));
        assert!(bounded.exhausted(10));
    }

    #[test]
    fn connection_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_connecting());
        assert!(!ConnectionState::Failed { reason: "gone".into() }.is_connected());
    }
}
