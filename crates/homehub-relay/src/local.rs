//! # Local Listener
//!
//! WebSocket server that peripherals connect to.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Local Listener                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    LocalListener (Axum)                         │   │
//! │  │                                                                 │   │
//! │  │  / and /ws ──▶ WebSocket upgrade (frames capped)               │   │
//! │  │                        │                                        │   │
//! │  │                        ▼                                        │   │
//! │  │              ┌─────────────────┐                                │   │
//! │  │              │ handle_socket   │ ◀───── one task per peer       │   │
//! │  │              └────────┬────────┘                                │   │
//! │  │                       │                                         │   │
//! │  │        reader ────────┼──────── writer (drains outbox, pings)   │   │
//! │  │                       │                                         │   │
//! │  └───────────────────────┼─────────────────────────────────────────┘   │
//! │                          ▼                                              │
//! │            LocalEvent ──► control loop (mpsc)                           │
//! │                                                                         │
//! │  Event Flow:                                                            │
//! │  ───────────                                                            │
//! │  1. Connected { endpoint, outbox }   on upgrade                        │
//! │  2. Message { endpoint, text }       per text frame                    │
//! │  3. Disconnected { endpoint }        on close or error                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The listener knows nothing about devices. A connection is identified
//! only by its remote socket address.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use homehub_core::Endpoint;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};

/// Ping interval to keep peripheral connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Listener Events
// =============================================================================

/// What the listener reports to the control loop.
#[derive(Debug)]
pub enum LocalEvent {
    /// A peripheral connected. Frames pushed into `outbox` are written to it.
    Connected {
        endpoint: Endpoint,
        outbox: mpsc::Sender<String>,
    },
    /// A text frame arrived.
    Message { endpoint: Endpoint, text: String },
    /// The connection closed.
    Disconnected { endpoint: Endpoint },
}

// =============================================================================
// Listener Configuration
// =============================================================================

/// Configuration for the local listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Full bind address, e.g. `0.0.0.0:81`.
    pub bind_addr: String,
    /// Largest accepted frame and message, in bytes.
    pub max_message_bytes: usize,
    /// Frames queued per connection.
    pub outbox_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            bind_addr: "0.0.0.0:81".to_string(),
            max_message_bytes: crate::protocol::DEFAULT_MAX_MESSAGE_BYTES,
            outbox_capacity: 32,
        }
    }
}

// =============================================================================
// Listener State
// =============================================================================

struct ListenerState {
    events_tx: mpsc::Sender<LocalEvent>,
    max_message_bytes: usize,
    outbox_capacity: usize,
}

// =============================================================================
// Local Listener
// =============================================================================

/// The peripheral-facing WebSocket server.
pub struct LocalListener {
    config: ListenerConfig,
    state: Arc<ListenerState>,
}

/// Handle for a running listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl ListenerHandle {
    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections.
    pub async fn shutdown(&self) -> RelayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| RelayError::ChannelError("Listener shutdown channel closed".into()))
    }
}

impl LocalListener {
    /// Creates a listener that reports to `events_tx`.
    pub fn new(config: ListenerConfig, events_tx: mpsc::Sender<LocalEvent>) -> Self {
        let state = Arc::new(ListenerState {
            events_tx,
            max_message_bytes: config.max_message_bytes,
            outbox_capacity: config.outbox_capacity,
        });
        LocalListener { config, state }
    }

    /// Binds and starts serving. Returns once the socket is bound.
    pub async fn start(self) -> RelayResult<ListenerHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let app = Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state);

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| RelayError::Bind {
                addr: self.config.bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| RelayError::Bind {
            addr: self.config.bind_addr.clone(),
            reason: e.to_string(),
        })?;

        info!(addr = %local_addr, "Local listener started");

        tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                shutdown_rx.recv().await;
                info!("Local listener shutting down");
            })
            .await;

            if let Err(e) = result {
                warn!(error = %e, "Local listener stopped with error");
            }
        });

        Ok(ListenerHandle {
            local_addr,
            shutdown_tx,
        })
    }
}

// =============================================================================
// WebSocket Handler
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ListenerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!(addr = %addr, "WebSocket upgrade");
    ws.max_message_size(state.max_message_bytes)
        .max_frame_size(state.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, Endpoint::new(addr)))
}

/// Handles one peripheral connection.
async fn handle_socket(socket: WebSocket, state: Arc<ListenerState>, endpoint: Endpoint) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(state.outbox_capacity);

    if state
        .events_tx
        .send(LocalEvent::Connected {
            endpoint,
            outbox: outbox_tx,
        })
        .await
        .is_err()
    {
        warn!(endpoint = %endpoint, "Control loop gone, dropping connection");
        return;
    }

    info!(endpoint = %endpoint, "Peripheral connected");

    // Writer: drains the outbox and keeps the link alive.
    let writer = tokio::spawn(async move {
        let mut ping_interval = interval(PING_INTERVAL);
        ping_interval.tick().await;
        loop {
            tokio::select! {
                frame = outbox_rx.recv() => {
                    let Some(text) = frame else { break };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        let text = match receiver.next().await {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!(endpoint = %endpoint, "Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) => {
                debug!(endpoint = %endpoint, "Peripheral requested close");
                break;
            }
            Some(Err(e)) => {
                warn!(endpoint = %endpoint, error = %e, "WebSocket error");
                break;
            }
            None => break,
        };

        if state
            .events_tx
            .send(LocalEvent::Message { endpoint, text })
            .await
            .is_err()
        {
            break;
        }
    }

    writer.abort();
    info!(endpoint = %endpoint, "Peripheral disconnected");
    let _ = state
        .events_tx
        .send(LocalEvent::Disconnected { endpoint })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:81");
        assert_eq!(config.max_message_bytes, 1024);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let listener = LocalListener::new(
            ListenerConfig {
                bind_addr: "not-an-address".to_string(),
                ..Default::default()
            },
            events_tx,
        );
        assert!(matches!(listener.start().await, Err(RelayError::Bind { .. })));
    }
}
