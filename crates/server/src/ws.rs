//! WebSocket handler for live work-order and manufacturing-order updates.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use trackmint_shared::{now_millis, ClientCommand, EntityKind, ServerEvent, WsEnvelope};
use uuid::Uuid;

use crate::state::{subscription_key, AppState};

type Forward = mpsc::UnboundedSender<WsEnvelope<ServerEvent>>;

/// WebSocket upgrade handler
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    tracing::info!("WebSocket connection {} opened", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<WsEnvelope<ServerEvent>>();
    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    // Task to forward events to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = forward_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main receive loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(text.as_str()) {
                Ok(command) => {
                    handle_client_command(command, conn_id, &mut subscriptions, &forward_tx, &state).await;
                }
                Err(e) => tracing::warn!("Connection {} sent an unreadable command: {}", conn_id, e),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("Connection {} errored: {}", conn_id, e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    for (key, handle) in subscriptions {
        end_subscription(&state, &key, handle).await;
    }
    send_task.abort();

    tracing::info!("WebSocket connection {} closed", conn_id);
}

/// Stop forwarding `key` and release its channel if nobody else listens.
async fn end_subscription(state: &AppState, key: &str, handle: JoinHandle<()>) {
    handle.abort();
    // The forward task owns the broadcast receiver; wait for it to drop.
    let _ = handle.await;
    state.release(key).await;
}

async fn handle_client_command(
    command: ClientCommand,
    conn_id: Uuid,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
    forward_tx: &Forward,
    state: &AppState,
) {
    match &command {
        ClientCommand::Subscribe { channel, id } => {
            let key = subscription_key(channel, id.as_deref());
            if subscriptions.contains_key(&key) {
                return;
            }
            tracing::debug!("Connection {} subscribing to {}", conn_id, key);

            let mut broadcast_rx = state.subscribe(&key).await;
            let forward_tx_for_task = forward_tx.clone();
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                loop {
                    match broadcast_rx.recv().await {
                        Ok(event) => {
                            if forward_tx_for_task.send(event).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("Subscriber to {} fell behind, skipped {} events", task_key, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });
            subscriptions.insert(key, handle);

            // A late subscriber gets the current state of a tracked entity.
            if let (Some(kind), Some(id)) = (EntityKind::parse(channel), id) {
                let floor = state.floor.lock().await;
                let snapshot = match kind {
                    EntityKind::WorkOrder => floor
                        .work_order(id, now_millis())
                        .map(ServerEvent::WorkOrderUpdate),
                    EntityKind::ManufacturingOrder => floor
                        .manufacturing_order(id)
                        .cloned()
                        .map(ServerEvent::ManufacturingOrderUpdate),
                };
                drop(floor);
                if let Some(event) = snapshot {
                    let _ = forward_tx.send(WsEnvelope::new(Uuid::new_v4().to_string(), event));
                }
            }
        }

        ClientCommand::Unsubscribe { channel, id } => {
            let key = subscription_key(channel, id.as_deref());
            tracing::debug!("Connection {} unsubscribing from {}", conn_id, key);
            if let Some(handle) = subscriptions.remove(&key) {
                end_subscription(state, &key, handle).await;
            }
        }

        _ => {
            tracing::debug!("Connection {} sent {}", conn_id, command.type_name());
            let events = state.floor.lock().await.apply(&command, now_millis());
            state.publish(events).await;
        }
    }
}
