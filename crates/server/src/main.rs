//! Trackmint Server - live-update relay
//!
//! A small Axum server that speaks the live-update protocol: clients
//! subscribe to work-order and manufacturing-order channels over `/ws`, and
//! timer and status commands are applied to an in-memory floor model whose
//! resulting events are broadcast back to subscribers.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackmint_shared::now_millis;

mod config;
mod floor;
mod state;
mod ws;

use config::ServerConfig;
use floor::Seed;
use state::AppState;

fn router(state: AppState) -> Router {
    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn load_seed(path: &Path) -> anyhow::Result<Seed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid seed file {}", path.display()))
}

/// Periodically re-broadcast every running timer so clients can correct drift.
fn spawn_timer_sync(state: AppState, period: Duration) {
    if period.is_zero() {
        tracing::info!("Timer sync disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let events = state.floor.lock().await.running_timers(now_millis());
            if !events.is_empty() {
                tracing::trace!("Re-broadcasting {} running timers", events.len());
                state.publish(events).await;
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackmint_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let state = AppState::new();
    if let Some(path) = &config.seed_file {
        let seed = load_seed(path)?;
        state.floor.lock().await.seed(seed);
    }
    spawn_timer_sync(state.clone(), config.timer_sync);

    tracing::info!("Starting server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::net::TcpStream;
    use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve() -> String {
        serve_state(AppState::new()).await
    }

    async fn serve_state(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("ws://{}/ws", addr)
    }

    async fn send(client: &mut Client, value: Value) {
        client.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn next_json(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for an event")
                .expect("connection closed")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn commands_are_relayed_to_subscribers() {
        let url = serve().await;
        let (mut operator, _) = connect_async(url.as_str()).await.unwrap();
        let (mut dashboard, _) = connect_async(url.as_str()).await.unwrap();

        // The dashboard hears its own event once its subscription is live.
        send(&mut dashboard, json!({"type": "subscribe", "channel": "work_orders"})).await;
        send(&mut dashboard, json!({"type": "pause_timer", "workOrderId": "wo-0", "timestamp": 0})).await;
        assert_eq!(next_json(&mut dashboard).await["data"]["workOrderId"], "wo-0");

        send(&mut operator, json!({"type": "subscribe", "channel": "work_order", "id": "wo-1"})).await;
        send(&mut operator, json!({"type": "start_timer", "workOrderId": "wo-1", "timestamp": 0})).await;

        let timer = next_json(&mut operator).await;
        assert_eq!(timer["type"], "timer_update");
        assert_eq!(timer["data"], json!({"workOrderId": "wo-1", "elapsedTime": 0}));
        assert!(timer["id"].is_string());
        assert!(timer["timestamp"].is_i64());

        let seen = next_json(&mut dashboard).await;
        assert_eq!(seen["id"], timer["id"]);

        send(
            &mut operator,
            json!({"type": "work_order_status_update", "workOrderId": "wo-1", "status": "Started", "timestamp": 0}),
        )
        .await;
        let change = next_json(&mut operator).await;
        assert_eq!(change["type"], "status_change");
        assert_eq!(change["data"], json!({"id": "wo-1", "type": "work_order", "status": "Started"}));

        let update = next_json(&mut operator).await;
        assert_eq!(update["type"], "work_order_update");
        assert_eq!(update["data"]["id"], "wo-1");
        assert_eq!(update["data"]["status"], "Started");
    }

    #[tokio::test]
    async fn channels_are_released_after_unsubscribe_and_disconnect() {
        let state = AppState::new();
        let url = serve_state(state.clone()).await;
        let (mut client, _) = connect_async(url.as_str()).await.unwrap();

        send(&mut client, json!({"type": "subscribe", "channel": "work_orders"})).await;
        send(&mut client, json!({"type": "subscribe", "channel": "work_order", "id": "wo-1"})).await;
        send(&mut client, json!({"type": "unsubscribe", "channel": "work_order", "id": "wo-1"})).await;

        // Commands are handled in order, so this echo means the unsubscribe is done.
        send(&mut client, json!({"type": "pause_timer", "workOrderId": "wo-2", "timestamp": 0})).await;
        assert_eq!(next_json(&mut client).await["data"]["workOrderId"], "wo-2");
        assert_eq!(state.open_channels().await, vec!["work_orders".to_string()]);

        client.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !state.open_channels().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("channels were not released after disconnect");
    }

    #[test]
    fn seed_file_is_read_and_validated() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("trackmint-seed-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&good, r#"{"workOrders": [{"id": "wo-1", "manufacturingOrderId": "mo-1"}]}"#).unwrap();
        let seed = load_seed(&good).unwrap();
        assert_eq!(seed.work_orders.len(), 1);
        assert!(seed.manufacturing_orders.is_empty());

        let bad = dir.join(format!("trackmint-seed-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&bad, "[1, 2").unwrap();
        let err = load_seed(&bad).unwrap_err();
        assert!(err.to_string().starts_with("invalid seed file"), "got {err}");

        std::fs::remove_file(good).unwrap();
        std::fs::remove_file(bad).unwrap();
        assert!(load_seed(&dir.join("trackmint-no-such-seed.json")).is_err());
    }

    #[tokio::test]
    async fn late_subscriber_receives_snapshot() {
        let url = serve().await;
        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        send(&mut first, json!({"type": "subscribe", "channel": "work_order", "id": "wo-9"})).await;
        send(
            &mut first,
            json!({"type": "work_order_status_update", "workOrderId": "wo-9", "status": "Paused", "timestamp": 0}),
        )
        .await;
        assert_eq!(next_json(&mut first).await["type"], "status_change");

        let (mut late, _) = connect_async(url.as_str()).await.unwrap();
        send(&mut late, json!({"type": "subscribe", "channel": "work_order", "id": "wo-9"})).await;
        let snapshot = next_json(&mut late).await;
        assert_eq!(snapshot["type"], "work_order_update");
        assert_eq!(snapshot["data"]["status"], "Paused");
    }
}
