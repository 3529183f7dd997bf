//! # homehub-relay: Message Relay for HomeHub
//!
//! Accepts connections from nearby peripherals, keeps the device registry,
//! and relays commands and events between those peripherals and one cloud
//! link.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Relay Architecture                               │
//! │                                                                         │
//! │   switch   blind   smoke          ┌──────────────────────────────────┐ │
//! │     │        │       │            │   cloud service                  │ │
//! │     └────────┼───────┘            └────────────────▲─────────────────┘ │
//! │              │ ws (port 81)                        │ ws(s)             │
//! │  ┌───────────▼────────────┐          ┌─────────────┴──────────────┐    │
//! │  │    LocalListener       │          │     Transport              │    │
//! │  │    (local.rs)          │          │     (transport.rs)         │    │
//! │  └───────────┬────────────┘          └─────────────▲──────────────┘    │
//! │              │ LocalEvent                          │ UpstreamEvent     │
//! │  ┌───────────▼─────────────────────────────────────┴──────────────┐    │
//! │  │                  HubAgent control loop (agent.rs)              │    │
//! │  │                                                                │    │
//! │  │  Router (router.rs)                                            │    │
//! │  │   ├── DeviceRegistry     (homehub-core)                        │    │
//! │  │   ├── UpstreamSession    (session.rs)                          │    │
//! │  │   ├── codec              (protocol.rs)                         │    │
//! │  │   ├── command translation (commands.rs)                        │    │
//! │  │   └── HubPeripherals     (peripherals.rs)                      │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `HubAgent` control loop and its handle
//! - [`commands`] - Per-type command translation
//! - [`config`] - Hub configuration (TOML + environment)
//! - [`error`] - Relay and decode error types
//! - [`local`] - Peripheral-facing WebSocket server
//! - [`peripherals`] - Alarm and display side effects
//! - [`protocol`] - Wire messages and codec
//! - [`router`] - Message classification and forwarding
//! - [`session`] - Upstream connection/auth state machine
//! - [`transport`] - Upstream WebSocket client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use homehub_relay::{HubAgent, HubConfig};
//!
//! let config = HubConfig::load(None)?;
//! let hub = HubAgent::new(config).start().await?;
//! hub.connect_upstream().await?;
//!
//! for device in hub.devices().await? {
//!     println!("{} {} {}", device.id, device.kind, device.status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod commands;
pub mod config;
pub mod error;
pub mod local;
pub mod peripherals;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{HubAgent, HubAgentHandle};
pub use config::HubConfig;
pub use error::{DecodeError, RelayError, RelayResult};
pub use peripherals::{HubPeripherals, LoggingPeripherals};
pub use protocol::{CloudMessage, DeviceMessage, HubToCloud, HubToDevice, WireMessage};
pub use router::{Router, RouterOptions};
pub use session::{Credentials, SessionState, UpstreamSession};
