//! Live-update module for real-time work-order and manufacturing-order updates.
//!
//! This module provides:
//! - The [`Transport`] contract and a native WebSocket implementation with auto-reconnect
//! - The [`UpdateCoordinator`], which decodes inbound frames, keeps a bounded
//!   log of recent updates, dispatches typed callbacks and sends commands
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Application shell               │
//! │   (owns the transport, calls connect/        │
//! │    disconnect, pumps transport events)       │
//! └──────────────────────────────────────────────┘
//!          │ TransportEvent            ▲ ClientCommand
//!          ▼                           │
//!   ┌───────────────────────────────────────────┐
//!   │            UpdateCoordinator              │
//!   │  decode → UpdateLog (100, newest first)   │
//!   │         → UpdateCallbacks                 │
//!   └───────────────────────────────────────────┘
//!          │
//!          ├──────────────┬──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │TimerDisplay│ │TimerDisplay│ │ dashboards │
//!   │  (wo-1)    │ │  (wo-2)    │ │            │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! The coordinator keeps no subscription table. After a reconnect, consumers
//! re-issue their subscriptions, typically from `on_connection_change`.

mod connection;
mod coordinator;
mod update_log;

pub use connection::{ConnectionState, ReconnectConfig, Transport, TransportEvent, WsTransport};
pub use coordinator::{UpdateCallbacks, UpdateCoordinator};
pub use update_log::{Update, UpdateLog, UPDATE_LOG_CAPACITY};

#[cfg(test)]
pub(crate) use connection::mock::MockTransport;
