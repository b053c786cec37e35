//! Live-update wire protocol.
//!
//! Server → client traffic is an envelope `{id?, type, data, timestamp?}`.
//! Client → server traffic is a flat command object tagged by `type`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, ManufacturingOrder, WorkOrder};

/// Milliseconds since the Unix epoch, the unit of every wire timestamp.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Envelope wrapping every server event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl<T> WsEnvelope<T> {
    pub fn new(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: Some(id.into()),
            payload,
            timestamp: Some(now_millis()),
        }
    }
}

/// Events pushed by the server to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    WorkOrderUpdate(WorkOrder),
    ManufacturingOrderUpdate(ManufacturingOrder),
    TimerUpdate {
        work_order_id: String,
        elapsed_time: u64,
    },
    StatusChange {
        id: String,
        #[serde(rename = "type")]
        entity_type: EntityKind,
        status: String,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> UpdateKind {
        match self {
            ServerEvent::WorkOrderUpdate(_) => UpdateKind::WorkOrderUpdate,
            ServerEvent::ManufacturingOrderUpdate(_) => UpdateKind::ManufacturingOrderUpdate,
            ServerEvent::TimerUpdate { .. } => UpdateKind::TimerUpdate,
            ServerEvent::StatusChange { .. } => UpdateKind::StatusChange,
        }
    }
}

/// Kind of an inbound update, as named by the envelope's `type` field.
///
/// Types this client does not know are kept verbatim in `Other` so they can
/// still be shown in an activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    WorkOrderUpdate,
    ManufacturingOrderUpdate,
    TimerUpdate,
    StatusChange,
    Other(String),
}

impl UpdateKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "work_order_update" => UpdateKind::WorkOrderUpdate,
            "manufacturing_order_update" => UpdateKind::ManufacturingOrderUpdate,
            "timer_update" => UpdateKind::TimerUpdate,
            "status_change" => UpdateKind::StatusChange,
            other => UpdateKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UpdateKind::WorkOrderUpdate => "work_order_update",
            UpdateKind::ManufacturingOrderUpdate => "manufacturing_order_update",
            UpdateKind::TimerUpdate => "timer_update",
            UpdateKind::StatusChange => "status_change",
            UpdateKind::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, UpdateKind::Other(_))
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands a client sends over the live-update channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Subscribe {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Unsubscribe {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    WorkOrderStatusUpdate {
        work_order_id: String,
        status: String,
        timestamp: i64,
    },
    ManufacturingOrderStatusUpdate {
        manufacturing_order_id: String,
        status: String,
        timestamp: i64,
    },
    StartTimer {
        work_order_id: String,
        timestamp: i64,
    },
    PauseTimer {
        work_order_id: String,
        timestamp: i64,
    },
    StopTimer {
        work_order_id: String,
        timestamp: i64,
    },
}

impl ClientCommand {
    /// `<kind>_status_update` for the given entity kind.
    pub fn status_update(kind: EntityKind, id: impl Into<String>, status: impl Into<String>, timestamp: i64) -> Self {
        let (id, status) = (id.into(), status.into());
        match kind {
            EntityKind::WorkOrder => ClientCommand::WorkOrderStatusUpdate {
                work_order_id: id,
                status,
                timestamp,
            },
            EntityKind::ManufacturingOrder => ClientCommand::ManufacturingOrderStatusUpdate {
                manufacturing_order_id: id,
                status,
                timestamp,
            },
        }
    }

    /// Wire name of this command's `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientCommand::Subscribe { .. } => "subscribe",
            ClientCommand::Unsubscribe { .. } => "unsubscribe",
            ClientCommand::WorkOrderStatusUpdate { .. } => "work_order_status_update",
            ClientCommand::ManufacturingOrderStatusUpdate { .. } => "manufacturing_order_status_update",
            ClientCommand::StartTimer { .. } => "start_timer",
            ClientCommand::PauseTimer { .. } => "pause_timer",
            ClientCommand::StopTimer { .. } => "stop_timer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subscribe_omits_missing_id() {
        let all = ClientCommand::Subscribe {
            channel: "work_orders".into(),
            id: None,
        };
        assert_eq!(serde_json::to_value(&all).unwrap(), json!({"type": "subscribe", "channel": "work_orders"}));

        let one = ClientCommand::Unsubscribe {
            channel: "work_order".into(),
            id: Some("wo-1".into()),
        };
        assert_eq!(
            serde_json::to_value(&one).unwrap(),
            json!({"type": "unsubscribe", "channel": "work_order", "id": "wo-1"})
        );
    }

    #[test]
    fn status_update_field_names_follow_entity_kind() {
        let wo = ClientCommand::status_update(EntityKind::WorkOrder, "wo-1", "Started", 10);
        assert_eq!(
            serde_json::to_value(&wo).unwrap(),
            json!({"type": "work_order_status_update", "workOrderId": "wo-1", "status": "Started", "timestamp": 10})
        );

        let mo = ClientCommand::status_update(EntityKind::ManufacturingOrder, "mo-7", "Done", 11);
        assert_eq!(
            serde_json::to_value(&mo).unwrap(),
            json!({"type": "manufacturing_order_status_update", "manufacturingOrderId": "mo-7", "status": "Done", "timestamp": 11})
        );
        assert_eq!(mo.type_name(), "manufacturing_order_status_update");
    }

    #[test]
    fn timer_commands_parse_from_wire() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"pause_timer","workOrderId":"wo-3","timestamp":99}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::PauseTimer {
                work_order_id: "wo-3".into(),
                timestamp: 99
            }
        );
    }

    #[test]
    fn server_event_envelope_shape() {
        let envelope = WsEnvelope {
            id: Some("evt-1".into()),
            payload: ServerEvent::TimerUpdate {
                work_order_id: "wo-1".into(),
                elapsed_time: 65,
            },
            timestamp: Some(1_700_000_000_000),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "id": "evt-1",
                "type": "timer_update",
                "data": {"workOrderId": "wo-1", "elapsedTime": 65},
                "timestamp": 1_700_000_000_000i64
            })
        );
    }

    #[test]
    fn status_change_uses_type_field() {
        let event = ServerEvent::StatusChange {
            id: "wo-2".into(),
            entity_type: EntityKind::WorkOrder,
            status: "Paused".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"], json!({"id": "wo-2", "type": "work_order", "status": "Paused"}));
        assert_eq!(event.kind(), UpdateKind::StatusChange);
    }

    #[test]
    fn unknown_update_kinds_are_preserved() {
        let kind = UpdateKind::from_wire("inventory_update");
        assert_eq!(kind, UpdateKind::Other("inventory_update".into()));
        assert_eq!(kind.as_str(), "inventory_update");
        assert!(!kind.is_known());
        assert!(UpdateKind::from_wire("timer_update").is_known());
    }
}
