//! # Message Router
//!
//! Classifies every inbound message, mutates the registry and session, and
//! decides where each message goes next.
//!
//! ## Routing Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Router Decisions                               │
//! │                                                                         │
//! │  FROM PERIPHERAL                                                       │
//! │  ───────────────                                                       │
//! │  registration ─► registry.register                                     │
//! │                   created: registration_confirm → origin               │
//! │                            device_added → cloud (if authenticated)     │
//! │                   updated: nothing sent                                │
//! │                   full:    dropped                                     │
//! │  status       ─► registry.update_status                                │
//! │                   found:   device_status → cloud (if authenticated)    │
//! │                   unknown: dropped                                     │
//! │  alert        ─► alarm ON + display (ALWAYS, no registry check)        │
//! │                   alert → cloud (if authenticated)                     │
//! │  heartbeat    ─► logged                                                │
//! │                                                                         │
//! │  FROM CLOUD                                                            │
//! │  ──────────                                                            │
//! │  control        ─► registry.lookup_by_id → command → that peripheral   │
//! │  status_request ─► hub_status → cloud                                  │
//! │  alarm          ─► alarm actuator + display                            │
//! │  auth_response  ─► session; on success hub_status → cloud              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//! Every send is a non-blocking `try_send` into a bounded channel: into the
//! per-connection outbox for peripherals, into the transport queue for the
//! cloud. A full or closed channel drops the frame. Nothing is queued for
//! later and nothing is retried.
//!
//! No failure is ever reported back to a peripheral. Each dropped message
//! produces exactly one log line.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use homehub_core::{CoreError, Device, DeviceRegistry, Endpoint, Registration, SensorReadings};

use crate::commands;
use crate::error::{RelayError, RelayResult};
use crate::peripherals::HubPeripherals;
use crate::protocol::{
    decode, CloudMessage, DeviceMessage, DeviceSummary, HubToCloud, HubToDevice, WireMessage,
    DEFAULT_MAX_MESSAGE_BYTES,
};
use crate::session::{SessionState, UpstreamSession};

// =============================================================================
// Router Options
// =============================================================================

/// Tunables for a [`Router`].
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Largest inbound frame accepted by the codec.
    pub max_message_bytes: usize,
    /// Translate `control` commands per device type.
    pub translate_commands: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        RouterOptions {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            translate_commands: false,
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Sole owner of the registry and the upstream session.
///
/// Every method takes `&mut self`; the agent's control loop is the only
/// caller, so no locking is involved.
pub struct Router<P: HubPeripherals> {
    registry: DeviceRegistry,
    session: UpstreamSession,
    peripherals: P,
    options: RouterOptions,

    /// Outboxes of open local connections.
    connections: HashMap<Endpoint, mpsc::Sender<String>>,

    /// Transport queue of the cloud link, once started.
    upstream: Option<mpsc::Sender<String>>,

    readings: SensorReadings,
    alarm_on: bool,
    started: Instant,
}

impl<P: HubPeripherals> Router<P> {
    /// Creates a router around an empty registry and a disconnected session.
    pub fn new(
        registry: DeviceRegistry,
        session: UpstreamSession,
        peripherals: P,
        options: RouterOptions,
    ) -> Self {
        Router {
            registry,
            session,
            peripherals,
            options,
            connections: HashMap::new(),
            upstream: None,
            readings: SensorReadings::default(),
            alarm_on: false,
            started: Instant::now(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Returns the upstream session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Returns the hub id.
    pub fn hub_id(&self) -> &str {
        self.session.hub_id()
    }

    /// Returns the current alarm state.
    pub fn alarm_on(&self) -> bool {
        self.alarm_on
    }

    /// Returns the latest sensor readings.
    pub fn readings(&self) -> SensorReadings {
        self.readings
    }

    /// Returns the peripherals.
    pub fn peripherals(&self) -> &P {
        &self.peripherals
    }

    /// Number of open local connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of every registered device, in registration order.
    pub fn devices(&self) -> Vec<Device> {
        self.registry.list().cloned().collect()
    }

    // =========================================================================
    // Local Connection Events
    // =========================================================================

    /// A peripheral connection opened.
    pub fn on_local_connected(&mut self, endpoint: Endpoint, outbox: mpsc::Sender<String>) {
        debug!(endpoint = %endpoint, "Local connection opened");
        self.connections.insert(endpoint, outbox);
    }

    /// A peripheral connection closed. Devices bound to it are detached.
    pub fn on_local_disconnected(&mut self, endpoint: Endpoint) {
        self.connections.remove(&endpoint);
        let detached = self.registry.detach_endpoint(endpoint);
        if detached.is_empty() {
            debug!(endpoint = %endpoint, "Local connection closed");
        } else {
            info!(endpoint = %endpoint, devices = ?detached, "Device connection closed");
        }
    }

    /// A text frame arrived from a peripheral.
    pub fn on_local_message(&mut self, endpoint: Endpoint, text: &str) {
        let message = match decode::<DeviceMessage>(text, self.options.max_message_bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Dropping undecodable device message");
                return;
            }
        };

        debug!(endpoint = %endpoint, msg_type = message.type_name(), "Device message");

        let result = match message {
            DeviceMessage::Registration {
                device_id,
                device_type,
            } => self.handle_registration(endpoint, &device_id, device_type),
            DeviceMessage::Status { device_id, status } => {
                self.handle_device_status(&device_id, &status)
            }
            DeviceMessage::Alert {
                device_id,
                alert_type,
            } => self.handle_alert(&device_id, &alert_type),
            DeviceMessage::Heartbeat { device_id } => {
                debug!(endpoint = %endpoint, device_id = ?device_id, "Device heartbeat");
                Ok(())
            }
        };

        if let Err(e) = result {
            log_drop(&e);
        }
    }

    fn handle_registration(
        &mut self,
        endpoint: Endpoint,
        device_id: &str,
        device_type: homehub_core::DeviceKind,
    ) -> RelayResult<()> {
        match self
            .registry
            .register(device_id, device_type.clone(), endpoint)?
        {
            Registration::Created => {
                info!(
                    device_id = %device_id,
                    device_type = %device_type,
                    endpoint = %endpoint,
                    "Device registered"
                );
                // The cloud learns about the device even if the confirm is lost.
                if let Err(e) =
                    self.send_local(endpoint, &HubToDevice::registration_confirm(device_id))
                {
                    log_drop(&e);
                }
                self.relay_upstream(&HubToCloud::DeviceAdded {
                    hub_id: self.hub_id().to_string(),
                    device_id: device_id.to_string(),
                    device_type,
                })
            }
            Registration::Updated => {
                debug!(device_id = %device_id, endpoint = %endpoint, "Device re-registered");
                Ok(())
            }
        }
    }

    fn handle_device_status(&mut self, device_id: &str, status: &str) -> RelayResult<()> {
        self.registry.update_status(device_id, status)?;
        debug!(device_id = %device_id, status = %status, "Device status updated");

        self.relay_upstream(&HubToCloud::DeviceStatus {
            hub_id: self.hub_id().to_string(),
            device_id: device_id.to_string(),
            status: status.to_string(),
        })
    }

    fn handle_alert(&mut self, device_id: &str, alert_type: &str) -> RelayResult<()> {
        warn!(device_id = %device_id, alert_type = %alert_type, "Device alert");

        self.alarm_on = true;
        self.peripherals.set_alarm(true);
        self.peripherals.show_alert(device_id, alert_type);

        self.relay_upstream(&HubToCloud::Alert {
            hub_id: self.hub_id().to_string(),
            device_id: device_id.to_string(),
            alert_type: alert_type.to_string(),
        })
    }

    // =========================================================================
    // Upstream Events
    // =========================================================================

    /// Installs the transport queue of the cloud link.
    pub fn attach_upstream(&mut self, upstream: mpsc::Sender<String>) {
        self.upstream = Some(upstream);
    }

    /// Returns true once a cloud link has been attached.
    pub fn has_upstream(&self) -> bool {
        self.upstream.is_some()
    }

    /// The transport started dialing.
    pub fn on_upstream_connecting(&mut self) {
        self.session.on_connecting();
    }

    /// The transport connected: authenticate right away.
    pub fn on_upstream_connected(&mut self) {
        let auth = self.session.on_connected();
        if let Err(e) = self.send_upstream(&auth) {
            log_drop(&e);
        }
    }

    /// The transport lost the link.
    pub fn on_upstream_disconnected(&mut self) {
        self.session.on_disconnected();
    }

    /// A text frame arrived from the cloud.
    pub fn on_upstream_message(&mut self, text: &str) {
        let message = match decode::<CloudMessage>(text, self.options.max_message_bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable cloud message");
                return;
            }
        };

        debug!(msg_type = message.type_name(), "Cloud message");

        let result = match message {
            CloudMessage::Control { device_id, command } => self.handle_control(&device_id, &command),
            CloudMessage::StatusRequest => self.report_status(),
            CloudMessage::Alarm { state } => {
                self.set_alarm(state);
                Ok(())
            }
            CloudMessage::AuthResponse { success } => {
                if self.session.on_auth_response(success) {
                    self.report_status()
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            log_drop(&e);
        }
    }

    fn handle_control(&self, device_id: &str, command: &str) -> RelayResult<()> {
        let device = self
            .registry
            .lookup_by_id(device_id)
            .ok_or_else(|| CoreError::UnknownDevice(device_id.to_string()))?;

        let Some(endpoint) = device.endpoint else {
            warn!(device_id = %device_id, command = %command, "Device has no open connection, dropping command");
            return Ok(());
        };

        let message = if self.options.translate_commands {
            match commands::translate(&device.kind, device_id, command) {
                Some(message) => message,
                None => {
                    warn!(
                        device_id = %device_id,
                        device_type = %device.kind,
                        command = %command,
                        "Command not supported by device type, dropping"
                    );
                    return Ok(());
                }
            }
        } else {
            HubToDevice::command(command)
        };

        self.send_local(endpoint, &message)?;
        info!(device_id = %device_id, command = %command, "Command forwarded");
        Ok(())
    }

    // =========================================================================
    // Operator Actions
    // =========================================================================

    /// Drives the alarm actuator and display.
    pub fn set_alarm(&mut self, on: bool) {
        info!(on, "Alarm state changed");
        self.alarm_on = on;
        self.peripherals.set_alarm(on);
        self.peripherals.show_alarm(on);
    }

    /// Stores the latest sensor readings for the next `hub_status`.
    pub fn update_readings(&mut self, readings: SensorReadings) {
        self.readings = readings;
    }

    /// Builds the `hub_status` snapshot.
    pub fn hub_status(&self) -> HubToCloud {
        HubToCloud::HubStatus {
            hub_id: self.hub_id().to_string(),
            temperature: self.readings.temperature,
            humidity: self.readings.humidity,
            alarm_state: self.alarm_on,
            connected_devices: self.registry.len(),
            devices: self.registry.list().map(DeviceSummary::from).collect(),
        }
    }

    /// Sends `hub_status` to the cloud if authenticated.
    pub fn report_status(&mut self) -> RelayResult<()> {
        let status = self.hub_status();
        self.relay_upstream(&status)
    }

    /// Sends the hub heartbeat if the link is up.
    pub fn send_heartbeat(&mut self) {
        if !self.session.state().is_link_up() {
            return;
        }

        let heartbeat = HubToCloud::Heartbeat {
            hub_id: self.hub_id().to_string(),
            time: self.started.elapsed().as_millis() as u64,
        };
        if let Err(e) = self.send_upstream(&heartbeat) {
            log_drop(&e);
        }
    }

    /// Sends one message to every open local connection.
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast(&mut self, message: &HubToDevice) -> RelayResult<usize> {
        let json = message.to_json()?;
        let mut delivered = 0;

        for (endpoint, outbox) in &self.connections {
            match outbox.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(endpoint = %endpoint, error = %e, "Broadcast frame dropped"),
            }
        }

        debug!(msg_type = message.type_name(), delivered, "Broadcast sent");
        Ok(delivered)
    }

    /// Logs the registry listing.
    pub fn log_inventory(&self) {
        info!(
            devices = self.registry.len(),
            capacity = self.registry.capacity(),
            connections = self.connections.len(),
            upstream = %self.session.state(),
            "Device inventory"
        );
        for device in self.registry.list() {
            let endpoint = device
                .endpoint
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string());
            info!(
                device_id = %device.id,
                device_type = %device.kind,
                status = %device.status,
                endpoint = %endpoint,
                last_seen = %device.last_seen,
                "  device"
            );
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Sends to one local connection.
    fn send_local(&self, endpoint: Endpoint, message: &HubToDevice) -> RelayResult<()> {
        let outbox = self
            .connections
            .get(&endpoint)
            .ok_or_else(|| RelayError::ChannelError(format!("no open connection for {}", endpoint)))?;

        let json = message.to_json()?;
        outbox.try_send(json).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::ChannelError(format!("outbox of {} is full", endpoint)),
            TrySendError::Closed(_) => RelayError::ChannelError(format!("connection {} closed", endpoint)),
        })?;

        debug!(endpoint = %endpoint, msg_type = message.type_name(), "Sent to device");
        Ok(())
    }

    /// Sends to the cloud if the link is up (auth, heartbeat).
    fn send_upstream(&self, message: &HubToCloud) -> RelayResult<()> {
        if !self.session.state().is_link_up() {
            return Err(RelayError::Disconnected);
        }
        let upstream = self.upstream.as_ref().ok_or(RelayError::Disconnected)?;

        let json = message.to_json()?;
        upstream.try_send(json).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::ChannelError("upstream queue is full".into()),
            TrySendError::Closed(_) => RelayError::Disconnected,
        })?;

        debug!(msg_type = message.type_name(), "Sent upstream");
        Ok(())
    }

    /// Relays to the cloud only if authenticated.
    fn relay_upstream(&self, message: &HubToCloud) -> RelayResult<()> {
        if !self.session.state().is_authenticated() {
            return Err(RelayError::LinkDown);
        }
        self.send_upstream(message)
    }
}

/// Logs a dropped message once, at a level matching its cause.
fn log_drop(error: &RelayError) {
    match error {
        RelayError::Core(CoreError::RegistryFull { capacity }) => {
            warn!(capacity, "Registry full, registration dropped")
        }
        RelayError::Core(CoreError::UnknownDevice(id)) => {
            warn!(device_id = %id, "Unknown device, message dropped")
        }
        RelayError::Core(e) => warn!(error = %e, "Invalid device message dropped"),
        RelayError::LinkDown => debug!("Upstream not authenticated, relay suppressed"),
        RelayError::Disconnected => debug!("Upstream link down, message dropped"),
        other => warn!(error = %other, "Message dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credentials;
    use homehub_core::DeviceKind;
    use serde_json::Value;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct Recorder {
        alarms: Vec<bool>,
        alerts: Vec<(String, String)>,
    }

    impl HubPeripherals for Recorder {
        fn set_alarm(&mut self, on: bool) {
            self.alarms.push(on);
        }
        fn show_alert(&mut self, device_id: &str, alert_type: &str) {
            self.alerts.push((device_id.to_string(), alert_type.to_string()));
        }
        fn show_alarm(&mut self, _on: bool) {}
    }

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(SocketAddr::from(([10, 0, 0, 2], port)))
    }

    fn router() -> Router<Recorder> {
        Router::new(
            DeviceRegistry::new(2),
            UpstreamSession::new("hub-1", Credentials::new("u", "p")),
            Recorder::default(),
            RouterOptions::default(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_heartbeat_requires_link() {
        let mut router = router();
        let (tx, mut rx) = mpsc::channel(8);
        router.attach_upstream(tx);

        router.send_heartbeat();
        assert!(drain(&mut rx).is_empty());

        router.on_upstream_connected();
        router.send_heartbeat();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["type"], "auth");
        assert_eq!(sent[1]["type"], "heartbeat");
        assert_eq!(sent[1]["hubId"], "hub-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_time_counts_from_start() {
        let mut router = router();
        let (tx, mut rx) = mpsc::channel(8);
        router.attach_upstream(tx);
        router.on_upstream_connected();

        tokio::time::advance(std::time::Duration::from_millis(1500)).await;
        router.send_heartbeat();

        let sent = drain(&mut rx);
        assert_eq!(sent[1]["type"], "heartbeat");
        assert_eq!(sent[1]["time"], 1500);
    }

    #[test]
    fn test_disconnect_detaches_device() {
        let mut router = router();
        let (tx, mut rx) = mpsc::channel(8);
        router.on_local_connected(ep(1), tx);
        router.on_local_message(ep(1), r#"{"type":"registration","deviceId":"a","deviceType":"smart_bulb"}"#);
        assert_eq!(drain(&mut rx).len(), 1);

        router.on_local_disconnected(ep(1));
        assert_eq!(router.connection_count(), 0);
        assert!(!router.registry().lookup_by_id("a").unwrap().is_attached());
    }

    #[test]
    fn test_cloud_alarm_drives_actuator() {
        let mut router = router();
        router.on_upstream_message(r#"{"type":"alarm","state":true}"#);
        router.on_upstream_message(r#"{"type":"alarm","state":false}"#);
        assert_eq!(router.peripherals().alarms, vec![true, false]);
        assert!(!router.alarm_on());
    }

    #[test]
    fn test_undecodable_messages_are_dropped() {
        let mut router = router();
        let (tx, mut rx) = mpsc::channel(8);
        router.on_local_connected(ep(1), tx);

        router.on_local_message(ep(1), "garbage");
        router.on_local_message(ep(1), r#"{"deviceId":"a"}"#);
        router.on_local_message(ep(1), r#"{"type":"registration"}"#);

        assert!(drain(&mut rx).is_empty());
        assert!(router.registry().is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let mut router = router();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        router.on_local_connected(ep(1), tx1);
        router.on_local_connected(ep(2), tx2);

        let delivered = router.broadcast(&HubToDevice::command("sync_time")).unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx1)[0]["command"], "sync_time");
        assert_eq!(drain(&mut rx2)[0]["command"], "sync_time");
    }

    #[test]
    fn test_translated_control() {
        let mut router = Router::new(
            DeviceRegistry::default(),
            UpstreamSession::new("hub-1", Credentials::default()),
            Recorder::default(),
            RouterOptions {
                translate_commands: true,
                ..Default::default()
            },
        );
        let (tx, mut rx) = mpsc::channel(8);
        router.on_local_connected(ep(3), tx);
        router.on_local_message(ep(3), r#"{"type":"registration","deviceId":"b","deviceType":"window_blind"}"#);
        drain(&mut rx);

        router.on_upstream_message(r#"{"type":"control","deviceId":"b","command":"position_75"}"#);
        router.on_upstream_message(r#"{"type":"control","deviceId":"b","command":"wiggle"}"#);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["command"], "position");
        assert_eq!(sent[0]["value"], 75);
        assert_eq!(sent[0]["deviceId"], "b");
    }

    #[test]
    fn test_hub_status_includes_readings() {
        let mut router = router();
        router.update_readings(SensorReadings {
            temperature: 22.5,
            humidity: 51.0,
        });
        let (tx, _rx) = mpsc::channel(8);
        router.on_local_connected(ep(1), tx);
        router.on_local_message(ep(1), r#"{"type":"registration","deviceId":"cam","deviceType":"smart_cam"}"#);

        match router.hub_status() {
            HubToCloud::HubStatus {
                temperature,
                humidity,
                connected_devices,
                devices,
                ..
            } => {
                assert_eq!(temperature, 22.5);
                assert_eq!(humidity, 51.0);
                assert_eq!(connected_devices, 1);
                assert_eq!(devices[0].kind, DeviceKind::SmartCam);
                assert_eq!(devices[0].status, "Unknown");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
