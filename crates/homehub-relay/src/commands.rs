//! # Command Translation
//!
//! Optional per-type rewriting of cloud `control` commands.
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬──────────────────────────────┐
//! │ device type      │ cloud command        │ sent to peripheral           │
//! ├──────────────────┼──────────────────────┼──────────────────────────────┤
//! │ smart_switch     │ anything             │ command as-is                │
//! │ smart_bulb       │ anything             │ command as-is                │
//! │ window_blind     │ up / down / stop     │ command as-is                │
//! │                  │ position_NN          │ "position", value NN         │
//! │ smoke_sensor     │ get_status           │ "read_sensor"                │
//! │                  │ set_sensitivity      │ command as-is                │
//! │ anything else    │ anything             │ command as-is                │
//! └──────────────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! Commands a blind or smoke sensor does not understand are rejected and the
//! caller drops them. Translated commands carry `deviceId`.

use homehub_core::DeviceKind;

use crate::protocol::HubToDevice;

/// Blind position prefix, e.g. `position_40`.
const POSITION_PREFIX: &str = "position_";

/// Translates a cloud command for a device of `kind`.
///
/// Returns `None` if the device type does not support the command.
pub fn translate(kind: &DeviceKind, device_id: &str, command: &str) -> Option<HubToDevice> {
    let (command, value) = match kind {
        DeviceKind::WindowBlind => match command {
            "up" | "down" | "stop" => (command, None),
            other => {
                let position = other.strip_prefix(POSITION_PREFIX)?.parse::<u32>().ok()?;
                ("position", Some(position))
            }
        },
        DeviceKind::SmokeSensor => match command {
            "get_status" => ("read_sensor", None),
            "set_sensitivity" => (command, None),
            _ => return None,
        },
        _ => (command, None),
    };

    Some(HubToDevice::Command {
        command: command.to_string(),
        device_id: Some(device_id.to_string()),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(command: &str, device_id: &str, value: Option<u32>) -> HubToDevice {
        HubToDevice::Command {
            command: command.to_string(),
            device_id: Some(device_id.to_string()),
            value,
        }
    }

    #[test]
    fn test_switch_commands_pass_through() {
        assert_eq!(
            translate(&DeviceKind::SmartSwitch, "sw", "toggle"),
            Some(cmd("toggle", "sw", None))
        );
        assert_eq!(
            translate(&DeviceKind::Other("fan".into()), "f", "spin"),
            Some(cmd("spin", "f", None))
        );
    }

    #[test]
    fn test_blind_position() {
        assert_eq!(
            translate(&DeviceKind::WindowBlind, "b1", "position_40"),
            Some(cmd("position", "b1", Some(40)))
        );
        assert_eq!(
            translate(&DeviceKind::WindowBlind, "b1", "stop"),
            Some(cmd("stop", "b1", None))
        );
        assert_eq!(translate(&DeviceKind::WindowBlind, "b1", "position_x"), None);
        assert_eq!(translate(&DeviceKind::WindowBlind, "b1", "spin"), None);
    }

    #[test]
    fn test_smoke_sensor_commands() {
        assert_eq!(
            translate(&DeviceKind::SmokeSensor, "s", "get_status"),
            Some(cmd("read_sensor", "s", None))
        );
        assert_eq!(
            translate(&DeviceKind::SmokeSensor, "s", "set_sensitivity"),
            Some(cmd("set_sensitivity", "s", None))
        );
        assert_eq!(translate(&DeviceKind::SmokeSensor, "s", "toggle"), None);
    }
}
