//! # homehub-core: Device Registry for HomeHub
//!
//! Domain types and the bounded device registry used by the hub's relay.
//! Nothing in here touches a socket or a runtime.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HomeHub Architecture                             │
//! │                                                                         │
//! │   peripherals ──ws──┐                           ┌──ws── cloud service   │
//! │                     ▼                           ▼                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                homehub-relay (control loop)                     │   │
//! │  │     local listener ──► Router ◄── upstream transport            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ owns                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ homehub-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌──────────────┐  ┌───────────┐  ┌─────────┐  │   │
//! │  │   │   types   │  │   registry   │  │validation │  │  error  │  │   │
//! │  │   │  Device   │  │ DeviceRegis- │  │ ids, type │  │CoreError│  │   │
//! │  │   │ Endpoint  │  │ try (cap 10) │  │ status    │  │         │  │   │
//! │  │   └───────────┘  └──────────────┘  └───────────┘  └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO RUNTIME                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Device, DeviceKind, Endpoint, SensorReadings
//! - [`registry`] - Bounded, insertion-ordered device table
//! - [`error`] - Domain error types
//! - [`validation`] - Checks on peripheral-supplied values
//!
//! ## Example Usage
//!
//! ```rust
//! use std::net::SocketAddr;
//! use homehub_core::{DeviceKind, DeviceRegistry, Endpoint, Registration};
//!
//! let mut registry = DeviceRegistry::new(10);
//! let endpoint = Endpoint::new(SocketAddr::from(([192, 168, 4, 7], 50123)));
//!
//! let outcome = registry.register("blind-01", DeviceKind::WindowBlind, endpoint).unwrap();
//! assert_eq!(outcome, Registration::Created);
//!
//! registry.update_status("blind-01", "closed").unwrap();
//! assert_eq!(registry.lookup_by_endpoint(endpoint).unwrap().status, "closed");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod registry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use registry::{DeviceRegistry, Registration, DEFAULT_CAPACITY};
pub use types::*;
