//! Trackmint client - live updates for the shop floor
//!
//! This crate contains the real-time update coordinator, the WebSocket
//! transport it runs over, the work-order timer card built on top of it, and
//! a small REST client for persisting work-order status.

pub mod api_client;
pub mod components;
pub mod config;
pub mod ws;

pub use api_client::ApiClient;
pub use config::ClientConfig;
pub use ws::{Transport, TransportEvent, UpdateCallbacks, UpdateCoordinator, WsTransport};
