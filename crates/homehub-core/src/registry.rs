//! # Device Registry
//!
//! Bounded, insertion-ordered table of known peripherals.
//!
//! ## Indexes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DeviceRegistry                                   │
//! │                                                                         │
//! │  devices: IndexMap<id, Device>        by_endpoint: HashMap<ep, [id]>   │
//! │  ─────────────────────────────        ────────────────────────────     │
//! │  "sw-1"    → Device { ep: A }         A → ["sw-1"]                     │
//! │  "blind-2" → Device { ep: B }         B → ["blind-2"]                  │
//! │  "smoke-3" → Device { ep: None }                                       │
//! │                                                                         │
//! │  • O(1) lookup by id and by endpoint                                   │
//! │  • list() walks devices in registration order                          │
//! │  • Entries are never removed; only endpoints are detached              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A registry entry lives for the process lifetime. Once `capacity` distinct
//! ids have registered, further new ids are refused with
//! [`CoreError::RegistryFull`] while known ids keep re-registering freely.

use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;

use crate::error::{CoreError, CoreResult};
use crate::types::{Device, DeviceKind, Endpoint};
use crate::validation::{validate_device_id, validate_device_type};

/// Default number of devices a hub will track.
pub const DEFAULT_CAPACITY: usize = 10;

/// Outcome of a successful [`DeviceRegistry::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new entry was inserted.
    Created,
    /// The id was already known; its type and endpoint were refreshed.
    Updated,
}

/// In-memory table of registered devices.
#[derive(Debug)]
pub struct DeviceRegistry {
    capacity: usize,
    devices: IndexMap<String, Device>,
    by_endpoint: HashMap<Endpoint, Vec<String>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DeviceRegistry {
    /// Creates an empty registry holding at most `capacity` devices.
    pub fn new(capacity: usize) -> Self {
        DeviceRegistry {
            capacity,
            devices: IndexMap::with_capacity(capacity),
            by_endpoint: HashMap::new(),
        }
    }

    /// Registers `id`, or refreshes it if already known.
    ///
    /// ## Behavior
    /// - Known id: type and endpoint are overwritten, status is kept,
    ///   returns [`Registration::Updated`]
    /// - New id below capacity: inserted with status "Unknown",
    ///   returns [`Registration::Created`]
    /// - New id at capacity: [`CoreError::RegistryFull`], nothing changes
    pub fn register(
        &mut self,
        id: &str,
        kind: DeviceKind,
        endpoint: Endpoint,
    ) -> CoreResult<Registration> {
        validate_device_id(id)?;
        validate_device_type(kind.as_str())?;

        if let Some(device) = self.devices.get_mut(id) {
            let previous = device.endpoint.replace(endpoint);
            device.kind = kind;
            device.last_seen = Utc::now();

            if previous != Some(endpoint) {
                if let Some(old) = previous {
                    Self::unindex(&mut self.by_endpoint, old, id);
                }
                self.by_endpoint
                    .entry(endpoint)
                    .or_default()
                    .push(id.to_string());
            }
            return Ok(Registration::Updated);
        }

        if self.devices.len() >= self.capacity {
            return Err(CoreError::RegistryFull {
                capacity: self.capacity,
            });
        }

        self.devices
            .insert(id.to_string(), Device::new(id, kind, Some(endpoint)));
        self.by_endpoint
            .entry(endpoint)
            .or_default()
            .push(id.to_string());

        Ok(Registration::Created)
    }

    /// Records a new status for a known device.
    pub fn update_status(&mut self, id: &str, status: &str) -> CoreResult<&Device> {
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownDevice(id.to_string()))?;
        device.status = status.to_string();
        device.last_seen = Utc::now();
        Ok(device)
    }

    /// Looks a device up by id.
    pub fn lookup_by_id(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Looks up the device bound to a local connection.
    ///
    /// When several ids are bound to the same connection, the one registered
    /// earliest is returned, regardless of the order they were bound in.
    pub fn lookup_by_endpoint(&self, endpoint: Endpoint) -> Option<&Device> {
        self.by_endpoint
            .get(&endpoint)?
            .iter()
            .filter_map(|id| self.devices.get_full(id))
            .min_by_key(|(index, _, _)| *index)
            .map(|(_, _, device)| device)
    }

    /// Unbinds every device attached to `endpoint`, returning their ids.
    ///
    /// Called when the local connection closes. The entries themselves stay.
    pub fn detach_endpoint(&mut self, endpoint: Endpoint) -> Vec<String> {
        let ids = self.by_endpoint.remove(&endpoint).unwrap_or_default();
        for id in &ids {
            if let Some(device) = self.devices.get_mut(id) {
                device.endpoint = None;
            }
        }
        ids
    }

    /// Iterates devices in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if nothing has registered yet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Maximum number of devices.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if no new id can be registered.
    pub fn is_full(&self) -> bool {
        self.devices.len() >= self.capacity
    }

    fn unindex(index: &mut HashMap<Endpoint, Vec<String>>, endpoint: Endpoint, id: &str) {
        if let Some(ids) = index.get_mut(&endpoint) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                index.remove(&endpoint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_STATUS;
    use std::net::SocketAddr;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(SocketAddr::from(([192, 168, 4, 10], port)))
    }

    #[test]
    fn test_register_creates_with_unknown_status() {
        let mut registry = DeviceRegistry::default();
        let outcome = registry
            .register("sw-1", DeviceKind::SmartSwitch, ep(1000))
            .unwrap();

        assert_eq!(outcome, Registration::Created);
        let device = registry.lookup_by_id("sw-1").unwrap();
        assert_eq!(device.status, UNKNOWN_STATUS);
        assert_eq!(device.endpoint, Some(ep(1000)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_updates_endpoint_and_keeps_status() {
        let mut registry = DeviceRegistry::default();
        registry
            .register("sw-1", DeviceKind::SmartSwitch, ep(1000))
            .unwrap();
        registry.update_status("sw-1", "ON").unwrap();

        let outcome = registry
            .register("sw-1", DeviceKind::SmartBulb, ep(2000))
            .unwrap();

        assert_eq!(outcome, Registration::Updated);
        let device = registry.lookup_by_id("sw-1").unwrap();
        assert_eq!(device.status, "ON");
        assert_eq!(device.kind, DeviceKind::SmartBulb);
        assert_eq!(device.endpoint, Some(ep(2000)));
        assert!(registry.lookup_by_endpoint(ep(1000)).is_none());
        assert_eq!(registry.lookup_by_endpoint(ep(2000)).unwrap().id, "sw-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_is_enforced_for_new_ids_only() {
        let mut registry = DeviceRegistry::new(2);
        registry.register("a", DeviceKind::SmartSwitch, ep(1)).unwrap();
        registry.register("b", DeviceKind::SmartSwitch, ep(2)).unwrap();

        let err = registry
            .register("c", DeviceKind::SmartSwitch, ep(3))
            .unwrap_err();
        assert_eq!(err, CoreError::RegistryFull { capacity: 2 });
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup_by_endpoint(ep(3)).is_none());

        // Known ids still re-register when full.
        assert_eq!(
            registry.register("a", DeviceKind::SmartSwitch, ep(9)).unwrap(),
            Registration::Updated
        );
    }

    #[test]
    fn test_update_status_unknown_device() {
        let mut registry = DeviceRegistry::default();
        let err = registry.update_status("ghost", "ON").unwrap_err();
        assert_eq!(err, CoreError::UnknownDevice("ghost".to_string()));
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let mut registry = DeviceRegistry::default();
        for (i, id) in ["zeta", "alpha", "mid"].iter().enumerate() {
            registry
                .register(id, DeviceKind::SmokeSensor, ep(100 + i as u16))
                .unwrap();
        }
        registry.register("alpha", DeviceKind::SmokeSensor, ep(500)).unwrap();

        let ids: Vec<&str> = registry.list().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_detach_endpoint_keeps_entry() {
        let mut registry = DeviceRegistry::default();
        registry.register("cam", DeviceKind::SmartCam, ep(7)).unwrap();

        let detached = registry.detach_endpoint(ep(7));
        assert_eq!(detached, vec!["cam".to_string()]);

        let device = registry.lookup_by_id("cam").unwrap();
        assert!(!device.is_attached());
        assert!(registry.lookup_by_endpoint(ep(7)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shared_endpoint_lookup_returns_earliest() {
        let mut registry = DeviceRegistry::default();
        registry.register("first", DeviceKind::SmartSwitch, ep(5)).unwrap();
        registry.register("second", DeviceKind::SmartBulb, ep(5)).unwrap();

        assert_eq!(registry.lookup_by_endpoint(ep(5)).unwrap().id, "first");
        assert_eq!(registry.detach_endpoint(ep(5)).len(), 2);
    }

    #[test]
    fn test_shared_endpoint_rebind_keeps_registration_order() {
        let mut registry = DeviceRegistry::default();
        registry.register("older", DeviceKind::SmartSwitch, ep(5)).unwrap();
        registry.register("newer", DeviceKind::SmartBulb, ep(5)).unwrap();

        // "older" moves away and comes back, landing behind "newer".
        registry.register("older", DeviceKind::SmartSwitch, ep(6)).unwrap();
        registry.register("older", DeviceKind::SmartSwitch, ep(5)).unwrap();

        assert_eq!(registry.lookup_by_endpoint(ep(5)).unwrap().id, "older");
    }

    #[test]
    fn test_long_fields_are_accepted() {
        let mut registry = DeviceRegistry::default();
        let kind = DeviceKind::from("smart_window_blind_with_tilt_v2_xyz");
        registry.register("blind-9", kind.clone(), ep(3)).unwrap();
        registry.update_status("blind-9", &"x".repeat(200)).unwrap();

        let device = registry.lookup_by_id("blind-9").unwrap();
        assert_eq!(device.kind, kind);
        assert_eq!(device.status.len(), 200);
    }

    #[test]
    fn test_invalid_registration_rejected() {
        let mut registry = DeviceRegistry::default();
        let err = registry
            .register("", DeviceKind::SmartSwitch, ep(1))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(registry.is_empty());
    }
}
