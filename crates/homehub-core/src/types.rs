//! # Domain Types
//!
//! Core domain types used throughout HomeHub.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Device       │   │   DeviceKind    │   │    Endpoint     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (peer-set)  │   │  SmartSwitch    │   │  remote socket  │       │
//! │  │  kind           │   │  SmartBulb      │   │  address of the │       │
//! │  │  status         │   │  WindowBlind    │   │  local          │       │
//! │  │  endpoint       │   │  SmokeSensor    │   │  connection     │       │
//! │  │  last_seen      │   │  SmartCam       │   │                 │       │
//! │  └─────────────────┘   │  Other(String)  │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity Model
//! A device id is chosen by the peripheral and is stable across reconnects.
//! The endpoint is whatever socket address the device last registered from;
//! a device that reconnects from a new address is only re-bound when it
//! sends `registration` again.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status recorded for a device until it reports one.
pub const UNKNOWN_STATUS: &str = "Unknown";

// =============================================================================
// Endpoint
// =============================================================================

/// Identity of a local connection: the peer's remote socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Wraps a remote socket address.
    pub const fn new(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }

    /// Returns the underlying socket address.
    pub const fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Device Kind
// =============================================================================

/// Category of a peripheral.
///
/// The set is open-ended: anything the hub does not recognise is kept
/// verbatim as [`DeviceKind::Other`] and round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceKind {
    /// Relay-driven mains switch.
    SmartSwitch,
    /// Relay-driven bulb.
    SmartBulb,
    /// Stepper-driven window blind.
    WindowBlind,
    /// Smoke / gas sensor.
    SmokeSensor,
    /// Camera node.
    SmartCam,
    /// Any other category reported by a peripheral.
    Other(String),
}

impl DeviceKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            DeviceKind::SmartSwitch => "smart_switch",
            DeviceKind::SmartBulb => "smart_bulb",
            DeviceKind::WindowBlind => "window_blind",
            DeviceKind::SmokeSensor => "smoke_sensor",
            DeviceKind::SmartCam => "smart_cam",
            DeviceKind::Other(name) => name,
        }
    }
}

impl From<&str> for DeviceKind {
    fn from(name: &str) -> Self {
        match name {
            "smart_switch" => DeviceKind::SmartSwitch,
            "smart_bulb" => DeviceKind::SmartBulb,
            "window_blind" => DeviceKind::WindowBlind,
            "smoke_sensor" => DeviceKind::SmokeSensor,
            "smart_cam" => DeviceKind::SmartCam,
            other => DeviceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for DeviceKind {
    fn from(name: String) -> Self {
        DeviceKind::from(name.as_str())
    }
}

impl From<DeviceKind> for String {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Device
// =============================================================================

/// A registered peripheral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Peripheral-assigned identifier, stable across reconnects.
    pub id: String,

    /// Device category.
    pub kind: DeviceKind,

    /// Last reported status ("Unknown" until the first `status`).
    pub status: String,

    /// Local connection the device last registered from.
    /// `None` once that connection has closed.
    pub endpoint: Option<Endpoint>,

    /// When the device was first registered.
    pub registered_at: DateTime<Utc>,

    /// Last registration or status report.
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Creates a freshly registered device with the unknown status.
    pub fn new(id: impl Into<String>, kind: DeviceKind, endpoint: Option<Endpoint>) -> Self {
        let now = Utc::now();
        Device {
            id: id.into(),
            kind,
            status: UNKNOWN_STATUS.to_string(),
            endpoint,
            registered_at: now,
            last_seen: now,
        }
    }

    /// Returns true if the device is bound to an open local connection.
    pub fn is_attached(&self) -> bool {
        self.endpoint.is_some()
    }
}

// =============================================================================
// Sensor Readings
// =============================================================================

/// Latest environmental readings supplied by the sensor driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 4, 2], port))
    }

    #[test]
    fn test_device_kind_round_trip_names() {
        assert_eq!(DeviceKind::from("smart_switch"), DeviceKind::SmartSwitch);
        assert_eq!(DeviceKind::from("smoke_sensor").as_str(), "smoke_sensor");
        assert_eq!(
            DeviceKind::from("garage_door"),
            DeviceKind::Other("garage_door".to_string())
        );
        assert_eq!(DeviceKind::from("garage_door").to_string(), "garage_door");
    }

    #[test]
    fn test_device_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&DeviceKind::WindowBlind).unwrap();
        assert_eq!(json, "\"window_blind\"");

        let kind: DeviceKind = serde_json::from_str("\"aquarium\"").unwrap();
        assert_eq!(kind, DeviceKind::Other("aquarium".to_string()));
    }

    #[test]
    fn test_new_device_defaults() {
        let device = Device::new("sw-1", DeviceKind::SmartSwitch, Some(Endpoint::new(addr(5000))));
        assert_eq!(device.status, UNKNOWN_STATUS);
        assert!(device.is_attached());
        assert_eq!(device.registered_at, device.last_seen);
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::from(addr(4242));
        assert_eq!(endpoint.to_string(), "192.168.4.2:4242");
    }
}
