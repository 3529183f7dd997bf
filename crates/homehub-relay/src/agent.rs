//! # Hub Agent
//!
//! Main orchestrator. Owns the router and runs the single control loop that
//! every event and every operator action passes through.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HubAgent Architecture                            │
//! │                                                                         │
//! │  ┌────────────────┐  LocalEvent   ┌──────────────────────────────────┐ │
//! │  │ LocalListener  │ ────────────► │          Control Loop            │ │
//! │  │ (axum, per-    │               │                                  │ │
//! │  │  peer tasks)   │ ◄──────────── │  tokio::select! over:            │ │
//! │  └────────────────┘  outbox frames│   • local events                 │ │
//! │                                   │   • upstream events              │ │
//! │  ┌────────────────┐ UpstreamEvent │   • operator commands            │ │
//! │  │   Transport    │ ────────────► │   • heartbeat tick (30s)         │ │
//! │  │ (WS client,    │               │   • inventory tick (60s)         │ │
//! │  │  fixed retry)  │ ◄──────────── │                                  │ │
//! │  └────────────────┘  queue frames │  Router: Registry + Session      │ │
//! │                                   │  (only writer, no locks)         │ │
//! │  ┌────────────────┐  HubCommand   │                                  │ │
//! │  │ HubAgentHandle │ ────────────► │                                  │ │
//! │  │ (cloneable)    │ ◄── oneshot ─ │                                  │ │
//! │  └────────────────┘               └──────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tasks other than the loop never touch the registry or the session. The
//! delayed upstream connect, the sensor driver and the operator buttons all
//! go through [`HubAgentHandle`].

use std::future::pending;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use homehub_core::{Device, DeviceRegistry, SensorReadings};

use crate::config::HubConfig;
use crate::error::{RelayError, RelayResult};
use crate::local::{ListenerConfig, ListenerHandle, LocalEvent, LocalListener};
use crate::peripherals::{HubPeripherals, LoggingPeripherals};
use crate::protocol::HubToDevice;
use crate::router::{Router, RouterOptions};
use crate::session::{Credentials, SessionState, UpstreamSession};
use crate::transport::{Transport, TransportConfig, TransportHandle, UpstreamEvent};

const LOCAL_EVENT_CAPACITY: usize = 256;
const UPSTREAM_EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 32;

// =============================================================================
// Commands
// =============================================================================

/// Requests handled by the control loop.
#[derive(Debug)]
enum HubCommand {
    SetAlarm(bool),
    ReportStatus(oneshot::Sender<RelayResult<()>>),
    ConnectUpstream,
    UpdateReadings(SensorReadings),
    Broadcast(HubToDevice, oneshot::Sender<RelayResult<usize>>),
    Devices(oneshot::Sender<Vec<Device>>),
    SessionState(oneshot::Sender<SessionState>),
    Shutdown,
}

// =============================================================================
// Hub Agent
// =============================================================================

/// Hub agent, ready to start.
pub struct HubAgent<P: HubPeripherals = LoggingPeripherals> {
    config: HubConfig,
    peripherals: P,
}

impl HubAgent<LoggingPeripherals> {
    /// Creates an agent whose peripherals only log.
    pub fn new(config: HubConfig) -> Self {
        Self::with_peripherals(config, LoggingPeripherals)
    }
}

impl<P: HubPeripherals> HubAgent<P> {
    /// Creates an agent driving the given peripherals.
    pub fn with_peripherals(config: HubConfig, peripherals: P) -> Self {
        HubAgent {
            config,
            peripherals,
        }
    }

    /// Binds the local listener and spawns the control loop.
    ///
    /// The upstream link is not started here; call
    /// [`HubAgentHandle::connect_upstream`] when ready.
    pub async fn start(self) -> RelayResult<HubAgentHandle> {
        self.config.validate()?;
        let upstream_url = self.config.upstream_url()?;

        info!(
            hub_id = %self.config.hub_id(),
            name = %self.config.hub.name,
            upstream = upstream_url.as_ref().map(Url::as_str).unwrap_or("none"),
            "Starting hub agent"
        );

        let (local_tx, local_rx) = mpsc::channel(LOCAL_EVENT_CAPACITY);
        let (upstream_tx, upstream_rx) = mpsc::channel(UPSTREAM_EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let listener = LocalListener::new(
            ListenerConfig {
                bind_addr: self.config.local.bind_address(),
                max_message_bytes: self.config.local.max_message_bytes,
                outbox_capacity: self.config.local.outbox_capacity,
            },
            local_tx,
        )
        .start()
        .await?;
        let local_addr = listener.local_addr();

        let router = Router::new(
            DeviceRegistry::new(self.config.registry.capacity),
            UpstreamSession::new(
                self.config.hub_id(),
                Credentials::new(
                    self.config.upstream.username.clone(),
                    self.config.upstream.password.clone(),
                ),
            ),
            self.peripherals,
            RouterOptions {
                max_message_bytes: self.config.local.max_message_bytes,
                translate_commands: self.config.registry.translate_commands,
            },
        );

        let control = ControlLoop {
            router,
            transport_config: upstream_url.map(|url| TransportConfig {
                url: url.to_string(),
                connect_timeout: self.config.connect_timeout(),
                reconnect_interval: self.config.reconnect_interval(),
                ..Default::default()
            }),
            transport: None,
            listener,
            upstream_tx,
        };

        tokio::spawn(control.run(
            local_rx,
            upstream_rx,
            command_rx,
            self.config.heartbeat_interval(),
            self.config.inventory_log_interval(),
        ));

        Ok(HubAgentHandle {
            command_tx,
            local_addr,
        })
    }
}

// =============================================================================
// Control Loop
// =============================================================================

struct ControlLoop<P: HubPeripherals> {
    router: Router<P>,
    transport_config: Option<TransportConfig>,
    transport: Option<TransportHandle>,
    listener: ListenerHandle,
    upstream_tx: mpsc::Sender<UpstreamEvent>,
}

impl<P: HubPeripherals> ControlLoop<P> {
    async fn run(
        mut self,
        mut local_rx: mpsc::Receiver<LocalEvent>,
        mut upstream_rx: mpsc::Receiver<UpstreamEvent>,
        mut command_rx: mpsc::Receiver<HubCommand>,
        heartbeat_every: std::time::Duration,
        inventory_every: Option<std::time::Duration>,
    ) {
        let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut inventory = inventory_every.map(|every| {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!("Control loop started");

        loop {
            tokio::select! {
                Some(event) = local_rx.recv() => self.on_local_event(event),

                Some(event) = upstream_rx.recv() => self.on_upstream_event(event),

                command = command_rx.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },

                _ = heartbeat.tick() => self.router.send_heartbeat(),

                _ = tick(&mut inventory) => self.router.log_inventory(),
            }
        }

        if let Some(transport) = self.transport.take() {
            let _ = transport.shutdown().await;
        }
        let _ = self.listener.shutdown().await;
        info!("Control loop stopped");
    }

    fn on_local_event(&mut self, event: LocalEvent) {
        match event {
            LocalEvent::Connected { endpoint, outbox } => {
                self.router.on_local_connected(endpoint, outbox)
            }
            LocalEvent::Message { endpoint, text } => self.router.on_local_message(endpoint, &text),
            LocalEvent::Disconnected { endpoint } => self.router.on_local_disconnected(endpoint),
        }
    }

    fn on_upstream_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Connecting => self.router.on_upstream_connecting(),
            UpstreamEvent::Connected => self.router.on_upstream_connected(),
            UpstreamEvent::Disconnected => self.router.on_upstream_disconnected(),
            UpstreamEvent::Message(text) => self.router.on_upstream_message(&text),
        }
    }

    fn on_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::SetAlarm(on) => self.router.set_alarm(on),
            HubCommand::ReportStatus(reply) => {
                let _ = reply.send(self.router.report_status());
            }
            HubCommand::ConnectUpstream => self.connect_upstream(),
            HubCommand::UpdateReadings(readings) => self.router.update_readings(readings),
            HubCommand::Broadcast(message, reply) => {
                let _ = reply.send(self.router.broadcast(&message));
            }
            HubCommand::Devices(reply) => {
                let _ = reply.send(self.router.devices());
            }
            HubCommand::SessionState(reply) => {
                let _ = reply.send(self.router.session_state());
            }
            HubCommand::Shutdown => {}
        }
    }

    fn connect_upstream(&mut self) {
        if self.transport.is_some() {
            debug!("Upstream transport already running");
            return;
        }

        let Some(config) = self.transport_config.clone() else {
            warn!("No upstream URL configured, staying local-only");
            return;
        };

        let handle = Transport::spawn(config, self.upstream_tx.clone());
        self.router.attach_upstream(handle.sender());
        self.transport = Some(handle);
    }
}

/// Ticks an optional interval; never completes when disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Handle for driving a running [`HubAgent`].
///
/// Every call is a message to the control loop. Once the loop has stopped,
/// calls fail with [`RelayError::ShuttingDown`].
#[derive(Debug, Clone)]
pub struct HubAgentHandle {
    command_tx: mpsc::Sender<HubCommand>,
    local_addr: std::net::SocketAddr,
}

impl HubAgentHandle {
    /// Address the local listener bound.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Switches the local alarm on or off.
    pub async fn set_alarm(&self, on: bool) -> RelayResult<()> {
        self.send(HubCommand::SetAlarm(on)).await
    }

    /// Pushes a `hub_status` snapshot upstream now.
    ///
    /// Fails with [`RelayError::LinkDown`] unless authenticated.
    pub async fn report_status(&self) -> RelayResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::ReportStatus(tx)).await?;
        rx.await.map_err(|_| RelayError::ShuttingDown)?
    }

    /// Starts the upstream link. Calling it again is a no-op.
    pub async fn connect_upstream(&self) -> RelayResult<()> {
        self.send(HubCommand::ConnectUpstream).await
    }

    /// Stores new sensor readings for the next `hub_status`.
    pub async fn update_readings(&self, readings: SensorReadings) -> RelayResult<()> {
        self.send(HubCommand::UpdateReadings(readings)).await
    }

    /// Sends one message to every connected peripheral.
    pub async fn broadcast(&self, message: HubToDevice) -> RelayResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Broadcast(message, tx)).await?;
        rx.await.map_err(|_| RelayError::ShuttingDown)?
    }

    /// Snapshot of registered devices, in registration order.
    pub async fn devices(&self) -> RelayResult<Vec<Device>> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Devices(tx)).await?;
        rx.await.map_err(|_| RelayError::ShuttingDown)
    }

    /// Current upstream session state.
    pub async fn session_state(&self) -> RelayResult<SessionState> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::SessionState(tx)).await?;
        rx.await.map_err(|_| RelayError::ShuttingDown)
    }

    /// Stops the control loop, the transport and the listener.
    pub async fn shutdown(&self) -> RelayResult<()> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, command: HubCommand) -> RelayResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RelayError::ShuttingDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> HubConfig {
        let mut config = HubConfig::default();
        config.hub.id = "hub-test".to_string();
        config.local.bind_addr = "127.0.0.1".to_string();
        config.local.port = 0;
        config
    }

    #[tokio::test]
    async fn test_agent_answers_queries() {
        let handle = HubAgent::new(local_config()).start().await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);

        assert!(handle.devices().await.unwrap().is_empty());
        assert_eq!(
            handle.session_state().await.unwrap(),
            SessionState::Disconnected
        );

        handle.set_alarm(true).await.unwrap();
        assert!(matches!(
            handle.report_status().await,
            Err(RelayError::LinkDown)
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_url_stays_local() {
        let handle = HubAgent::new(local_config()).start().await.unwrap();
        handle.connect_upstream().await.unwrap();
        assert_eq!(
            handle.session_state().await.unwrap(),
            SessionState::Disconnected
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = local_config();
        config.registry.capacity = 0;
        let err = HubAgent::new(config).start().await.unwrap_err();
        assert!(err.is_config_error());
    }
}
