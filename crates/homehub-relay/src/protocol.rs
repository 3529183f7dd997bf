//! # Hub Protocol Messages
//!
//! Message types exchanged with peripherals and with the cloud service.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hub Protocol Messages                            │
//! │                                                                         │
//! │  PERIPHERAL → HUB (DeviceMessage)                                      │
//! │  ────────────────────────────────                                      │
//! │  registration { deviceId, deviceType }                                 │
//! │  status       { deviceId, status }                                     │
//! │  alert        { deviceId, alertType }                                  │
//! │  heartbeat    { deviceId }                                             │
//! │                                                                         │
//! │  HUB → PERIPHERAL (HubToDevice)                                        │
//! │  ──────────────────────────────                                        │
//! │  registration_confirm { deviceId, success }                            │
//! │  command              { command [, deviceId, value] }                  │
//! │                                                                         │
//! │  HUB → CLOUD (HubToCloud)                                              │
//! │  ────────────────────────                                              │
//! │  auth          { hubId, username, password }                           │
//! │  device_added  { hubId, deviceId, deviceType }                         │
//! │  device_status { hubId, deviceId, status }                             │
//! │  alert         { hubId, deviceId, alertType }                          │
//! │  heartbeat     { hubId, time }                                         │
//! │  hub_status    { hubId, temperature, humidity, alarmState,             │
//! │                  connectedDevices, devices: [{id, type, status}] }     │
//! │                                                                         │
//! │  CLOUD → HUB (CloudMessage)                                            │
//! │  ──────────────────────────                                            │
//! │  control        { deviceId, command }                                  │
//! │  status_request { }                                                    │
//! │  alarm          { state }                                              │
//! │  auth_response  { success }                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! One JSON object per WebSocket text frame, internally tagged by `type`:
//! ```json
//! { "type": "registration", "deviceId": "sw-1", "deviceType": "smart_switch" }
//! ```
//! Consumers read by key, so field order carries no meaning. Unknown extra
//! fields are ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use homehub_core::{Device, DeviceKind};

use crate::error::{DecodeError, RelayResult};

/// Largest frame accepted by default, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024;

// =============================================================================
// Wire Message Trait
// =============================================================================

/// A message family that travels in one direction over one link.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Every `type` value this family understands.
    const TYPES: &'static [&'static str];

    /// Returns the wire `type` of this message (for logging).
    fn type_name(&self) -> &'static str;

    /// Serializes to a JSON string.
    fn to_json(&self) -> RelayResult<String> {
        encode(self)
    }

    /// Deserializes from a JSON string, enforcing `max_bytes`.
    fn from_json(text: &str, max_bytes: usize) -> Result<Self, DecodeError> {
        decode(text, max_bytes)
    }
}

/// Encodes a message as a single JSON object.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> RelayResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a text frame into a message of family `T`.
///
/// ## Checks (in order)
/// 1. Size bound ([`DecodeError::TooLarge`])
/// 2. Well-formed JSON ([`DecodeError::Malformed`])
/// 3. Top level is an object ([`DecodeError::NotAnObject`])
/// 4. String `type` present ([`DecodeError::MissingType`])
/// 5. `type` known to `T` ([`DecodeError::UnknownType`])
/// 6. Variant fields present and typed ([`DecodeError::InvalidFields`])
pub fn decode<T: WireMessage>(text: &str, max_bytes: usize) -> Result<T, DecodeError> {
    if text.len() > max_bytes {
        return Err(DecodeError::TooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let kind = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(DecodeError::MissingType),
        },
        _ => return Err(DecodeError::NotAnObject),
    };

    if !T::TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidFields {
        kind,
        reason: e.to_string(),
    })
}

// =============================================================================
// Peripheral → Hub
// =============================================================================

/// Messages sent by peripherals to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// A peripheral announcing itself.
    #[serde(rename_all = "camelCase")]
    Registration {
        device_id: String,
        device_type: DeviceKind,
    },

    /// A peripheral reporting its state.
    #[serde(rename_all = "camelCase")]
    Status { device_id: String, status: String },

    /// A peripheral raising an alarm condition (smoke, gas, intrusion).
    ///
    /// Both fields are optional on the wire so that a sloppy alert still
    /// sounds the alarm.
    #[serde(rename_all = "camelCase")]
    Alert {
        #[serde(default)]
        device_id: String,
        #[serde(default)]
        alert_type: String,
    },

    /// Peripheral keepalive.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        #[serde(default)]
        device_id: Option<String>,
    },
}

impl WireMessage for DeviceMessage {
    const TYPES: &'static [&'static str] = &["registration", "status", "alert", "heartbeat"];

    fn type_name(&self) -> &'static str {
        match self {
            DeviceMessage::Registration { .. } => "registration",
            DeviceMessage::Status { .. } => "status",
            DeviceMessage::Alert { .. } => "alert",
            DeviceMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

// =============================================================================
// Hub → Peripheral
// =============================================================================

/// Messages sent by the hub to peripherals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubToDevice {
    /// Acknowledges a first-time registration.
    #[serde(rename_all = "camelCase")]
    RegistrationConfirm { device_id: String, success: bool },

    /// Instructs a peripheral to act.
    ///
    /// `device_id` and `value` are only present on translated commands.
    #[serde(rename_all = "camelCase")]
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<u32>,
    },
}

impl HubToDevice {
    /// Creates a successful registration confirmation.
    pub fn registration_confirm(device_id: &str) -> Self {
        HubToDevice::RegistrationConfirm {
            device_id: device_id.to_string(),
            success: true,
        }
    }

    /// Creates a plain command carrying only the command text.
    pub fn command(command: &str) -> Self {
        HubToDevice::Command {
            command: command.to_string(),
            device_id: None,
            value: None,
        }
    }
}

impl WireMessage for HubToDevice {
    const TYPES: &'static [&'static str] = &["registration_confirm", "command"];

    fn type_name(&self) -> &'static str {
        match self {
            HubToDevice::RegistrationConfirm { .. } => "registration_confirm",
            HubToDevice::Command { .. } => "command",
        }
    }
}

// =============================================================================
// Hub → Cloud
// =============================================================================

/// One row of the `hub_status` device listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub status: String,
}

impl From<&Device> for DeviceSummary {
    fn from(device: &Device) -> Self {
        DeviceSummary {
            id: device.id.clone(),
            kind: device.kind.clone(),
            status: device.status.clone(),
        }
    }
}

/// Messages sent by the hub to the cloud service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubToCloud {
    /// Credential exchange, sent once per successful connect.
    #[serde(rename_all = "camelCase")]
    Auth {
        hub_id: String,
        username: String,
        password: String,
    },

    /// A peripheral registered for the first time.
    #[serde(rename_all = "camelCase")]
    DeviceAdded {
        hub_id: String,
        device_id: String,
        device_type: DeviceKind,
    },

    /// A peripheral reported a new status.
    #[serde(rename_all = "camelCase")]
    DeviceStatus {
        hub_id: String,
        device_id: String,
        status: String,
    },

    /// A peripheral raised an alert.
    #[serde(rename_all = "camelCase")]
    Alert {
        hub_id: String,
        device_id: String,
        alert_type: String,
    },

    /// Hub keepalive. `time` is milliseconds since hub start.
    #[serde(rename_all = "camelCase")]
    Heartbeat { hub_id: String, time: u64 },

    /// Full hub snapshot.
    #[serde(rename_all = "camelCase")]
    HubStatus {
        hub_id: String,
        temperature: f32,
        humidity: f32,
        alarm_state: bool,
        connected_devices: usize,
        devices: Vec<DeviceSummary>,
    },
}

impl WireMessage for HubToCloud {
    const TYPES: &'static [&'static str] = &[
        "auth",
        "device_added",
        "device_status",
        "alert",
        "heartbeat",
        "hub_status",
    ];

    fn type_name(&self) -> &'static str {
        match self {
            HubToCloud::Auth { .. } => "auth",
            HubToCloud::DeviceAdded { .. } => "device_added",
            HubToCloud::DeviceStatus { .. } => "device_status",
            HubToCloud::Alert { .. } => "alert",
            HubToCloud::Heartbeat { .. } => "heartbeat",
            HubToCloud::HubStatus { .. } => "hub_status",
        }
    }
}

// =============================================================================
// Cloud → Hub
// =============================================================================

/// Messages sent by the cloud service to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudMessage {
    /// Forward `command` to the peripheral `device_id`.
    #[serde(rename_all = "camelCase")]
    Control { device_id: String, command: String },

    /// Ask for a `hub_status` snapshot.
    StatusRequest,

    /// Drive the local alarm.
    Alarm { state: bool },

    /// Answer to `auth`.
    AuthResponse { success: bool },
}

impl WireMessage for CloudMessage {
    const TYPES: &'static [&'static str] = &["control", "status_request", "alarm", "auth_response"];

    fn type_name(&self) -> &'static str {
        match self {
            CloudMessage::Control { .. } => "control",
            CloudMessage::StatusRequest => "status_request",
            CloudMessage::Alarm { .. } => "alarm",
            CloudMessage::AuthResponse { .. } => "auth_response",
        }
    }
}
