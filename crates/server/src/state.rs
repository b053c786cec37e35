//! Application state shared across request handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use trackmint_shared::{EntityKind, ServerEvent, WsEnvelope};
use uuid::Uuid;

use crate::floor::Floor;

const CHANNEL_CAPACITY: usize = 100;

pub type EventSender = broadcast::Sender<WsEnvelope<ServerEvent>>;
pub type EventReceiver = broadcast::Receiver<WsEnvelope<ServerEvent>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Pub/sub registry keyed by channel (`work_order:wo-1`, `work_orders`).
    channels: Arc<RwLock<HashMap<String, EventSender>>>,
    pub floor: Arc<Mutex<Floor>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            floor: Arc::new(Mutex::new(Floor::new())),
        }
    }

    /// Subscribe to the broadcast channel for a channel key, creating it on
    /// first use. The receiver is taken under the registry lock so a
    /// concurrent `release` cannot orphan it.
    pub async fn subscribe(&self, key: &str) -> EventReceiver {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(key) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(key) {
            return sender.subscribe();
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(key.to_string(), tx);
        rx
    }

    /// Drop the channel for `key` once its last subscriber is gone.
    pub async fn release(&self, key: &str) {
        let mut channels = self.channels.write().await;
        if channels.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(key);
            tracing::debug!("Released channel {}, {} still open", key, channels.len());
        }
    }

    #[cfg(test)]
    pub(crate) async fn open_channels(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.channels.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Broadcast each event on its entity channel and on its kind's plural
    /// channel. Channels nobody ever subscribed to are skipped.
    pub async fn publish(&self, events: Vec<ServerEvent>) {
        let channels = self.channels.read().await;
        for event in events {
            let envelope = WsEnvelope::new(Uuid::new_v4().to_string(), event);
            for key in channels_for(&envelope.payload) {
                if let Some(tx) = channels.get(&key) {
                    // No receivers is fine: everyone may have unsubscribed.
                    let _ = tx.send(envelope.clone());
                }
            }
        }
    }
}

/// Channel key for a subscribe/unsubscribe command: `channel:id`, or the
/// bare channel name when no id is given.
pub fn subscription_key(channel: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{}:{}", channel, id),
        None => channel.to_string(),
    }
}

/// The entity channel and the plural channel an event belongs to.
pub fn channels_for(event: &ServerEvent) -> [String; 2] {
    let (kind, id) = match event {
        ServerEvent::WorkOrderUpdate(wo) => (EntityKind::WorkOrder, wo.id.as_str()),
        ServerEvent::ManufacturingOrderUpdate(mo) => (EntityKind::ManufacturingOrder, mo.id.as_str()),
        ServerEvent::TimerUpdate { work_order_id, .. } => (EntityKind::WorkOrder, work_order_id.as_str()),
        ServerEvent::StatusChange { id, entity_type, .. } => (*entity_type, id.as_str()),
    };
    [
        subscription_key(kind.as_str(), Some(id)),
        kind.plural().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_route_to_entity_and_plural_channels() {
        let timer = ServerEvent::TimerUpdate {
            work_order_id: "wo-1".into(),
            elapsed_time: 3,
        };
        assert_eq!(channels_for(&timer), ["work_order:wo-1".to_string(), "work_orders".to_string()]);

        let status = ServerEvent::StatusChange {
            id: "mo-2".into(),
            entity_type: EntityKind::ManufacturingOrder,
            status: "Done".into(),
        };
        assert_eq!(
            channels_for(&status),
            ["manufacturing_order:mo-2".to_string(), "manufacturing_orders".to_string()]
        );
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_only() {
        let state = AppState::new();
        let mut entity_rx = state.subscribe("work_order:wo-1").await;
        let mut plural_rx = state.subscribe("work_orders").await;
        let mut other_rx = state.subscribe("work_order:wo-2").await;

        let event = ServerEvent::TimerUpdate {
            work_order_id: "wo-1".into(),
            elapsed_time: 12,
        };
        state.publish(vec![event.clone()]).await;

        let from_entity = entity_rx.recv().await.unwrap();
        let from_plural = plural_rx.recv().await.unwrap();
        assert_eq!(from_entity.payload, event);
        assert_eq!(from_plural.id, from_entity.id);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn release_drops_channels_without_subscribers() {
        let state = AppState::new();
        let kept = state.subscribe("work_orders").await;
        let dropped = state.subscribe("work_order:wo-1").await;

        // Still subscribed: nothing is released.
        state.release("work_order:wo-1").await;
        assert_eq!(state.open_channels().await.len(), 2);

        drop(dropped);
        state.release("work_order:wo-1").await;
        state.release("work_orders").await;
        state.release("never_created").await;

        assert_eq!(state.open_channels().await, vec!["work_orders".to_string()]);
        drop(kept);
    }
}
