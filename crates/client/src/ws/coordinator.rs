//! Live-update coordinator: decodes inbound frames, keeps the recent-update
//! log, routes each update to its callback, and sends real-time commands.
//!
//! The coordinator is driven by whoever owns the transport's event stream:
//!
//! ```rust,ignore
//! let (transport, mut events) = WsTransport::new(config.ws_url, config.reconnect);
//! let callbacks = UpdateCallbacks::default()
//!     .on_timer_update(|id, secs| tracing::info!("{id}: {secs}s"));
//! let mut coordinator = UpdateCoordinator::new(transport.clone(), callbacks);
//!
//! transport.connect();
//! while let Some(event) = events.next().await {
//!     coordinator.handle_event(event);
//! }
//! ```

use serde_json::Value;
use trackmint_shared::{now_millis, ClientCommand, EntityKind, UpdateKind, WorkOrderStatus};

use super::connection::{Transport, TransportEvent};
use super::update_log::{Update, UpdateLog};

type EntityCallback = Box<dyn FnMut(&Value) + Send>;
type TimerCallback = Box<dyn FnMut(&str, u64) + Send>;
type StatusCallback = Box<dyn FnMut(&str, &str, &str) + Send>;
type ConnectionCallback = Box<dyn FnMut(bool) + Send>;

/// Optional handlers, one per inbound update kind.
///
/// A missing handler only means the update is logged and nothing else happens.
#[derive(Default)]
pub struct UpdateCallbacks {
    pub on_work_order_update: Option<EntityCallback>,
    pub on_manufacturing_order_update: Option<EntityCallback>,
    /// `(work_order_id, elapsed_seconds)`
    pub on_timer_update: Option<TimerCallback>,
    /// `(entity_id, entity_type, new_status)`
    pub on_status_change: Option<StatusCallback>,
    /// Called whenever the effective connection state flips.
    pub on_connection_change: Option<ConnectionCallback>,
}

impl UpdateCallbacks {
    pub fn on_work_order_update(mut self, f: impl FnMut(&Value) + Send + 'static) -> Self {
        self.on_work_order_update = Some(Box::new(f));
        self
    }

    pub fn on_manufacturing_order_update(mut self, f: impl FnMut(&Value) + Send + 'static) -> Self {
        self.on_manufacturing_order_update = Some(Box::new(f));
        self
    }

    pub fn on_timer_update(mut self, f: impl FnMut(&str, u64) + Send + 'static) -> Self {
        self.on_timer_update = Some(Box::new(f));
        self
    }

    pub fn on_status_change(mut self, f: impl FnMut(&str, &str, &str) + Send + 'static) -> Self {
        self.on_status_change = Some(Box::new(f));
        self
    }

    pub fn on_connection_change(mut self, f: impl FnMut(bool) + Send + 'static) -> Self {
        self.on_connection_change = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for UpdateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCallbacks")
            .field("on_work_order_update", &self.on_work_order_update.is_some())
            .field("on_manufacturing_order_update", &self.on_manufacturing_order_update.is_some())
            .field("on_timer_update", &self.on_timer_update.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_connection_change", &self.on_connection_change.is_some())
            .finish()
    }
}

/// Single point of truth for live updates over one shared transport.
pub struct UpdateCoordinator<T: Transport> {
    transport: T,
    callbacks: UpdateCallbacks,
    log: UpdateLog,
    /// Set by `Open`, cleared by `Close`/`Error`.
    open: bool,
    /// Last effective state reported through `on_connection_change`.
    reported_connected: bool,
}

impl<T: Transport> UpdateCoordinator<T> {
    pub fn new(transport: T, callbacks: UpdateCallbacks) -> Self {
        Self {
            transport,
            callbacks,
            log: UpdateLog::new(),
            open: false,
            reported_connected: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True only when the transport says it is connected and the last event
    /// seen here was an `Open`.
    pub fn is_connected(&self) -> bool {
        self.open && self.transport.is_connected()
    }

    /// Recent updates, newest first.
    pub fn updates(&self) -> &UpdateLog {
        &self.log
    }

    pub fn latest_update(&self) -> Option<&Update> {
        self.log.latest()
    }

    pub fn clear_updates(&mut self) {
        self.log.clear();
    }

    // --- Inbound ---

    /// Feed one transport event through the coordinator.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                tracing::info!("Live updates connected");
                self.open = true;
            }
            TransportEvent::Close => {
                tracing::info!("Live updates disconnected");
                self.open = false;
            }
            TransportEvent::Error(reason) => {
                tracing::warn!("Live update connection error: {}", reason);
                self.open = false;
            }
            TransportEvent::Message(text) => self.handle_message(&text),
        }
        self.report_connection_change();
    }

    /// Decode, log and dispatch one inbound text frame. Never fails.
    pub fn handle_message(&mut self, text: &str) {
        let update = match Update::decode(text, now_millis()) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("Dropping live update: {}", e);
                return;
            }
        };

        tracing::debug!("Live update {} ({})", update.id, update.kind);
        self.log.push(update);
        if let Some(latest) = self.log.latest() {
            dispatch(&mut self.callbacks, latest);
        }
    }

    fn report_connection_change(&mut self) {
        let connected = self.is_connected();
        if connected == self.reported_connected {
            return;
        }
        self.reported_connected = connected;
        if let Some(cb) = self.callbacks.on_connection_change.as_mut() {
            cb(connected);
        }
    }

    // --- Outbound ---

    fn send(&self, command: ClientCommand) {
        tracing::debug!("Live command {}", command.type_name());
        self.transport.send(&command);
    }

    pub fn subscribe_to_entity(&self, kind: EntityKind, id: &str) {
        self.send(ClientCommand::Subscribe {
            channel: kind.as_str().to_string(),
            id: Some(id.to_string()),
        });
    }

    pub fn unsubscribe_from_entity(&self, kind: EntityKind, id: &str) {
        self.send(ClientCommand::Unsubscribe {
            channel: kind.as_str().to_string(),
            id: Some(id.to_string()),
        });
    }

    pub fn subscribe_to_all_of_kind(&self, kind: EntityKind) {
        self.send(ClientCommand::Subscribe {
            channel: kind.plural().to_string(),
            id: None,
        });
    }

    pub fn unsubscribe_from_all_of_kind(&self, kind: EntityKind) {
        self.send(ClientCommand::Unsubscribe {
            channel: kind.plural().to_string(),
            id: None,
        });
    }

    /// Send `<kind>_status_update` for any entity kind.
    pub fn push_status_update(&self, kind: EntityKind, id: &str, status: &str) {
        self.send(ClientCommand::status_update(kind, id, status, now_millis()));
    }

    pub fn update_work_order_status(&self, id: &str, status: WorkOrderStatus) {
        self.push_status_update(EntityKind::WorkOrder, id, status.as_str());
    }

    pub fn update_manufacturing_order_status(&self, id: &str, status: &str) {
        self.push_status_update(EntityKind::ManufacturingOrder, id, status);
    }

    pub fn start_timer(&self, work_order_id: &str) {
        self.send(ClientCommand::StartTimer {
            work_order_id: work_order_id.to_string(),
            timestamp: now_millis(),
        });
    }

    pub fn pause_timer(&self, work_order_id: &str) {
        self.send(ClientCommand::PauseTimer {
            work_order_id: work_order_id.to_string(),
            timestamp: now_millis(),
        });
    }

    pub fn stop_timer(&self, work_order_id: &str) {
        self.send(ClientCommand::StopTimer {
            work_order_id: work_order_id.to_string(),
            timestamp: now_millis(),
        });
    }
}

/// Route an update to the matching callback, if its payload carries what
/// that callback needs.
fn dispatch(callbacks: &mut UpdateCallbacks, update: &Update) {
    let payload = &update.payload;
    match &update.kind {
        UpdateKind::WorkOrderUpdate => {
            if payload.is_null() {
                tracing::warn!("work_order_update {} has no data", update.id);
            } else if let Some(cb) = callbacks.on_work_order_update.as_mut() {
                cb(payload);
            }
        }
        UpdateKind::ManufacturingOrderUpdate => {
            if payload.is_null() {
                tracing::warn!("manufacturing_order_update {} has no data", update.id);
            } else if let Some(cb) = callbacks.on_manufacturing_order_update.as_mut() {
                cb(payload);
            }
        }
        UpdateKind::TimerUpdate => {
            let work_order_id = str_field(payload, "workOrderId");
            let elapsed = payload.get("elapsedTime").and_then(elapsed_seconds);
            match (work_order_id, elapsed) {
                (Some(id), Some(secs)) => {
                    if let Some(cb) = callbacks.on_timer_update.as_mut() {
                        cb(id, secs);
                    }
                }
                _ => tracing::warn!("timer_update {} is missing workOrderId or elapsedTime", update.id),
            }
        }
        UpdateKind::StatusChange => {
            let fields = (
                str_field(payload, "id"),
                str_field(payload, "type"),
                str_field(payload, "status"),
            );
            match fields {
                (Some(id), Some(entity_type), Some(status)) => {
                    if let Some(cb) = callbacks.on_status_change.as_mut() {
                        cb(id, entity_type, status);
                    }
                }
                _ => tracing::warn!("status_change {} is missing id, type or status", update.id),
            }
        }
        UpdateKind::Other(kind) => {
            tracing::debug!("Ignoring live update of unknown type {:?}", kind);
        }
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Whole seconds from a non-negative JSON number; fractions are truncated.
fn elapsed_seconds(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}
