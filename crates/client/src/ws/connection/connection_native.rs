//! Native WebSocket transport using tokio-tungstenite.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use trackmint_shared::ClientCommand;

use super::{ConnectionState, ReconnectConfig, Transport, TransportEvent};

/// A managed WebSocket connection to the live-update server.
///
/// Cloning yields another handle onto the same connection. Connecting spawns
/// a background tokio task that reconnects with exponential backoff until
/// [`Transport::disconnect`] is called or the attempts are exhausted.
#[derive(Clone)]
pub struct WsTransport {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    reconnect_config: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    events: UnboundedSender<TransportEvent>,
    /// Outbound frames for the live socket; `None` while not connected.
    outbound: Mutex<Option<UnboundedSender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver going away just means nobody is listening any more.
        let _ = self.events.unbounded_send(event);
    }
}

impl WsTransport {
    /// Create a transport for `url` together with the stream of its events.
    pub fn new(
        url: impl Into<String>,
        reconnect_config: ReconnectConfig,
    ) -> (Self, UnboundedReceiver<TransportEvent>) {
        let (events, receiver) = unbounded();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let transport = Self {
            inner: Arc::new(Inner {
                url: url.into(),
                reconnect_config,
                state,
                events,
                outbound: Mutex::new(None),
                task: Mutex::new(None),
            }),
        };

        (transport, receiver)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }
}

impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    fn send(&self, command: &ClientCommand) {
        let json = match serde_json::to_string(command) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Serialize failed: {}", e);
                return;
            }
        };

        let outbound = lock(&self.inner.outbound);
        match outbound.as_ref() {
            Some(sender) => {
                tracing::debug!("Sending to {}: {}", self.inner.url, json);
                if let Err(e) = sender.unbounded_send(json) {
                    tracing::warn!("Send failed: {}", e);
                }
            }
            None => {
                tracing::debug!("Not connected, dropping {}", command.type_name());
            }
        }
    }

    /// Must be called from within a tokio runtime.
    fn connect(&self) {
        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("Connection loop for {} already running", self.inner.url);
            return;
        }
        *task = Some(tokio::spawn(run_connection_loop(self.inner.clone())));
    }

    fn disconnect(&self) {
        let Some(task) = lock(&self.inner.task).take() else {
            return;
        };
        task.abort();

        lock(&self.inner.outbound).take();
        let was_connected = self.is_connected();
        self.inner.set_state(ConnectionState::Disconnected);
        if was_connected {
            self.inner.emit(TransportEvent::Close);
        }
        tracing::info!("Disconnected from {}", self.inner.url);
    }
}

/// Why a live socket stopped.
enum SocketEnd {
    Closed,
    Failed(String),
}

/// Connection management loop: connect, pump frames both ways, back off, repeat.
async fn run_connection_loop(inner: Arc<Inner>) {
    let mut attempt = 0u32;

    loop {
        if attempt == 0 {
            inner.set_state(ConnectionState::Connecting);
        } else {
            inner.set_state(ConnectionState::Reconnecting { attempt });
        }

        match connect_async(inner.url.as_str()).await {
            Ok((ws_stream, _response)) => {
                attempt = 0;
                tracing::info!("WebSocket connected to {}", inner.url);

                let (mut write, mut read) = ws_stream.split();
                let (outbound_tx, mut outbound_rx) = unbounded::<String>();
                *lock(&inner.outbound) = Some(outbound_tx);
                inner.set_state(ConnectionState::Connected);
                inner.emit(TransportEvent::Open);

                let end = loop {
                    tokio::select! {
                        incoming = read.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                tracing::trace!("WebSocket received: {}", text.as_str());
                                inner.emit(TransportEvent::Message(text.as_str().to_owned()));
                            }
                            Some(Ok(Message::Close(_))) | None => break SocketEnd::Closed,
                            Some(Ok(Message::Ping(data))) => {
                                // Pong is handled automatically by tungstenite
                                tracing::trace!("Received ping: {:?}", data);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => break SocketEnd::Failed(e.to_string()),
                        },
                        outgoing = outbound_rx.next() => match outgoing {
                            Some(json) => {
                                if let Err(e) = write.send(Message::Text(json.into())).await {
                                    break SocketEnd::Failed(e.to_string());
                                }
                            }
                            None => break SocketEnd::Closed,
                        },
                    }
                };

                lock(&inner.outbound).take();
                inner.set_state(ConnectionState::Disconnected);
                match end {
                    SocketEnd::Closed => {
                        tracing::info!("WebSocket to {} closed", inner.url);
                        inner.emit(TransportEvent::Close);
                    }
                    SocketEnd::Failed(reason) => {
                        tracing::warn!("WebSocket to {} failed: {}", inner.url, reason);
                        inner.emit(TransportEvent::Error(reason));
                    }
                }

                let delay = inner.reconnect_config.delay_for_attempt(0);
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            Err(e) => {
                tracing::error!("WebSocket error for {}: {}", inner.url, e);
                inner.emit(TransportEvent::Error(e.to_string()));

                if inner.reconnect_config.exhausted(attempt) {
                    inner.set_state(ConnectionState::Failed {
                        reason: format!(
                            "Max reconnect attempts ({}) exceeded",
                            inner.reconnect_config.max_attempts
                        ),
                    });
                    break;
                }

                let delay = inner.reconnect_config.delay_for_attempt(attempt);
                tracing::info!(
                    "Reconnecting to {} in {}ms (attempt {})",
                    inner.url,
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 20,
            backoff_multiplier: 1.0,
        }
    }

    async fn next_event(events: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("timed out waiting for transport event")
            .expect("event stream ended")
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let (transport, _events) = WsTransport::new("ws://127.0.0.1:1/ws", fast_reconnect(1));
        assert!(!transport.is_connected());
        transport.send(&ClientCommand::StartTimer {
            work_order_id: "wo-1".into(),
            timestamp: 0,
        });
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (transport, mut events) = WsTransport::new("ws://127.0.0.1:1/ws", fast_reconnect(1));
        let mut state = transport.watch_state();
        transport.connect();

        assert!(matches!(next_event(&mut events).await, TransportEvent::Error(_)));

        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Failed { .. })),
        )
        .await
        .expect("never reached Failed")
        .unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn exchanges_frames_with_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let received = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.as_str().to_owned(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            };
            let reply = r#"{"type":"timer_update","data":{"workOrderId":"wo-1","elapsedTime":3}}"#;
            ws.send(Message::Text(reply.into())).await.unwrap();
            received
        });

        let (transport, mut events) =
            WsTransport::new(format!("ws://{addr}/ws"), fast_reconnect(1));
        transport.connect();
        assert_eq!(next_event(&mut events).await, TransportEvent::Open);
        assert!(transport.is_connected());

        transport.send(&ClientCommand::Subscribe {
            channel: "work_order".into(),
            id: Some("wo-1".into()),
        });

        match next_event(&mut events).await {
            TransportEvent::Message(text) => assert!(text.contains("timer_update")),
            other => panic!("expected message, got {other:?}"),
        }

        let received = server.await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&received).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "subscribe", "channel": "work_order", "id": "wo-1"})
        );

        transport.disconnect();
        assert!(!transport.is_connected());
    }
}
