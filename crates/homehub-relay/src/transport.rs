//! # Upstream Transport
//!
//! WebSocket client for the cloud link, reconnecting forever at a fixed
//! interval.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Upstream Connection Lifecycle                        │
//! │                                                                         │
//! │  ┌────────────┐   spawn()     ┌────────────┐                           │
//! │  │Disconnected│ ────────────► │ Connecting │ ── event: Connecting      │
//! │  └────────────┘               └─────┬──────┘                           │
//! │        ▲                            │                                   │
//! │        │                  success   │   failure / timeout               │
//! │        │                      ┌─────┴─────┐                            │
//! │        │                      ▼           ▼                             │
//! │        │            ┌────────────┐  ┌────────────┐                     │
//! │        │            │ Connected  │  │ Backoff    │                     │
//! │        │            └─────┬──────┘  └─────┬──────┘                     │
//! │        │  event: Connected│               │ fixed interval elapsed     │
//! │        │                  │ link lost     │                             │
//! │        │                  ▼               │                             │
//! │        └──────────── event: Disconnected ◄┘                            │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Constant)                                           │
//! │  ───────────────────────────                                           │
//! │  Every attempt waits `reconnect_interval` (5s by default), forever.    │
//! │  Authentication is not the transport's concern: a fresh `auth` is      │
//! │  sent by the router after every Connected event.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames queued while the link was down are discarded when a new link
//! comes up, so nothing composed before the next authentication leaks out.

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, RelayResult};

/// Frames the router may queue for the cloud before new ones are dropped.
pub const UPSTREAM_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Transport Events
// =============================================================================

/// What the transport reports to the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Dialing started.
    Connecting,
    /// WebSocket handshake complete.
    Connected,
    /// Attempt failed or link lost.
    Disconnected,
    /// A text frame from the cloud.
    Message(String),
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the upstream transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL to connect to.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Fixed delay between attempts.
    pub reconnect_interval: Duration,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle for feeding and stopping a running transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    outgoing_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
}

impl TransportHandle {
    /// Returns the queue the router writes encoded frames into.
    pub fn sender(&self) -> mpsc::Sender<String> {
        self.outgoing_tx.clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> RelayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| RelayError::ChannelError("Failed to send shutdown signal".into()))
    }
}

// =============================================================================
// WebSocket Transport
// =============================================================================

/// Upstream WebSocket transport with fixed-interval reconnect.
///
/// ## Usage
/// ```rust,ignore
/// let (events_tx, mut events_rx) = mpsc::channel(64);
/// let handle = Transport::spawn(TransportConfig {
///     url: "wss://cloud.example.com/ws/hub/hub-1".into(),
///     ..Default::default()
/// }, events_tx);
///
/// while let Some(event) = events_rx.recv().await {
///     if event == UpstreamEvent::Connected {
///         handle.sender().try_send(auth_json.clone())?;
///     }
/// }
/// ```
pub struct Transport {
    config: TransportConfig,
    outgoing_rx: mpsc::Receiver<String>,
    events_tx: mpsc::Sender<UpstreamEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Transport {
    /// Spawns the transport task. Events are delivered on `events_tx`.
    pub fn spawn(config: TransportConfig, events_tx: mpsc::Sender<UpstreamEvent>) -> TransportHandle {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(UPSTREAM_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let transport = Transport {
            config,
            outgoing_rx,
            events_tx,
            shutdown_rx,
        };

        tokio::spawn(transport.run());

        TransportHandle {
            outgoing_tx,
            shutdown_tx,
        }
    }

    /// Main transport loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Upstream transport starting");

        let mut backoff = Constant::new(self.config.reconnect_interval);

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Transport received shutdown signal");
                break;
            }

            if !self.emit(UpstreamEvent::Connecting).await {
                break;
            }

            match self.connect_with_timeout().await {
                Ok(ws_stream) => {
                    let stale = self.discard_stale_frames();
                    if stale > 0 {
                        debug!(stale, "Discarded frames queued while offline");
                    }

                    info!("Upstream WebSocket connected");
                    if !self.emit(UpstreamEvent::Connected).await {
                        break;
                    }

                    match self.connection_loop(ws_stream).await {
                        Ok(true) => {
                            let _ = self.emit(UpstreamEvent::Disconnected).await;
                            break;
                        }
                        Ok(false) => info!("Upstream closed the connection"),
                        Err(e) => warn!(error = %e, "Upstream connection lost"),
                    }
                }
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Failed to connect upstream");
                }
            }

            if !self.emit(UpstreamEvent::Disconnected).await {
                break;
            }

            if let Some(duration) = backoff.next_backoff() {
                debug!(?duration, "Waiting before reconnect");

                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            }
        }

        info!("Upstream transport stopped");
    }

    /// Forwards an event to the control loop. Returns false once it is gone.
    async fn emit(&self, event: UpstreamEvent) -> bool {
        if self.events_tx.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping transport");
            return false;
        }
        true
    }

    fn discard_stale_frames(&mut self) -> usize {
        let mut count = 0;
        while self.outgoing_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Connects with timeout.
    async fn connect_with_timeout(
        &self,
    ) -> RelayResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let connect_future = connect_async(self.config.url.as_str());

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(RelayError::from(e)),
            Err(_) => Err(RelayError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Pumps frames both ways until the link ends.
    ///
    /// Returns `Ok(true)` if it ended because of a shutdown request.
    async fn connection_loop(
        &mut self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> RelayResult<bool> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                Some(text) = self.outgoing_rx.recv() => {
                    write.send(WsMessage::Text(text.into())).await?;
                }

                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            if !self.emit(UpstreamEvent::Message(text.to_string())).await {
                                return Err(RelayError::ChannelError("Receiver dropped".into()));
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Received close frame");
                            return Ok(false);
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            warn!("Received unexpected binary message");
                        }
                        Some(Ok(WsMessage::Frame(_))) => {}
                        Some(Err(e)) => return Err(RelayError::from(e)),
                        None => return Ok(false),
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(Vec::new().into())).await?;
                    debug!("Sent ping");
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing upstream connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_constant_backoff_never_grows() {
        let mut backoff = Constant::new(Duration::from_secs(5));
        for _ in 0..10 {
            assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream_reports_connecting_then_disconnected() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events_tx, mut events_rx) = mpsc::channel(8);
        let handle = Transport::spawn(
            TransportConfig {
                url: format!("ws://{}/ws/hub/test", addr),
                connect_timeout: Duration::from_secs(2),
                reconnect_interval: Duration::from_secs(60),
                ..Default::default()
            },
            events_tx,
        );

        assert_eq!(events_rx.recv().await, Some(UpstreamEvent::Connecting));
        assert_eq!(events_rx.recv().await, Some(UpstreamEvent::Disconnected));

        handle.shutdown().await.unwrap();
    }
}
