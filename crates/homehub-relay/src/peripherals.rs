//! # Hub Peripherals
//!
//! The hub's own actuators and display, seen from the router.
//!
//! The router only needs three side effects. How the alarm relay is driven
//! or what the display shows is the driver's business.

use tracing::{info, warn};

/// Local actuators and display driven by the router.
pub trait HubPeripherals: Send + 'static {
    /// Drives the alarm actuator.
    fn set_alarm(&mut self, on: bool);

    /// Shows an incoming alert on the local display.
    fn show_alert(&mut self, device_id: &str, alert_type: &str);

    /// Shows the current alarm state on the local display.
    fn show_alarm(&mut self, on: bool);
}

/// Peripherals that only log, for hubs without local hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPeripherals;

impl HubPeripherals for LoggingPeripherals {
    fn set_alarm(&mut self, on: bool) {
        info!(on, "Alarm actuator");
    }

    fn show_alert(&mut self, device_id: &str, alert_type: &str) {
        warn!(device_id = %device_id, alert_type = %alert_type, "ALERT");
    }

    fn show_alarm(&mut self, on: bool) {
        info!(state = if on { "ON" } else { "OFF" }, "Alarm display");
    }
}

impl<P: HubPeripherals + ?Sized> HubPeripherals for Box<P> {
    fn set_alarm(&mut self, on: bool) {
        (**self).set_alarm(on)
    }

    fn show_alert(&mut self, device_id: &str, alert_type: &str) {
        (**self).show_alert(device_id, alert_type)
    }

    fn show_alarm(&mut self, on: bool) {
        (**self).show_alarm(on)
    }
}
