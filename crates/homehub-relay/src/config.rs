//! # Hub Configuration
//!
//! Configuration for the hub daemon and its relay.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HOMEHUB_ID=hub-livingroom                                          │
//! │     HOMEHUB_UPSTREAM_URL=wss://cloud.example.com                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/homehub/hub.toml (Linux)                                 │
//! │     ~/Library/Application Support/io.homehub.hub/hub.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated hub id, port 81, capacity 10                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # hub.toml
//! [hub]
//! id = "hub-3C71BF"
//! name = "Living Room"
//!
//! [upstream]
//! url = "wss://cloud.example.com"
//! username = "owner"
//! password = "secret"
//! reconnect_interval_secs = 5
//! heartbeat_interval_secs = 30
//!
//! [local]
//! port = 81
//! max_message_bytes = 1024
//!
//! [registry]
//! capacity = 10
//! translate_commands = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::protocol::DEFAULT_MAX_MESSAGE_BYTES;

// =============================================================================
// Hub Identity
// =============================================================================

/// Identity of this hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    /// Hub identifier sent in every upstream message.
    /// Generated and written back to the config file if not provided.
    #[serde(default = "default_hub_id")]
    pub id: String,

    /// Human-readable name.
    #[serde(default = "default_hub_name")]
    pub name: String,
}

fn default_hub_id() -> String {
    format!("hub-{}", Uuid::new_v4().simple())
}

fn default_hub_name() -> String {
    "HomeHub".to_string()
}

impl Default for HubSection {
    fn default() -> Self {
        HubSection {
            id: default_hub_id(),
            name: default_hub_name(),
        }
    }
}

// =============================================================================
// Upstream Settings
// =============================================================================

/// Settings for the cloud link.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamSection {
    /// WebSocket URL of the cloud service. `None` keeps the hub local-only.
    #[serde(default)]
    pub url: Option<String>,

    /// Append `/ws/hub/{id}` to `url`.
    #[serde(default = "default_true")]
    pub append_hub_path: bool,

    /// Account name sent in `auth`.
    #[serde(default)]
    pub username: String,

    /// Account password sent in `auth`.
    #[serde(default)]
    pub password: String,

    /// Fixed delay between reconnect attempts (seconds).
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Hub heartbeat period (seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Delay before the first connect after startup (seconds).
    #[serde(default)]
    pub connect_delay_secs: u64,
}

// Credentials stay out of logs.
impl std::fmt::Debug for UpstreamSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSection")
            .field("url", &self.url)
            .field("append_hub_path", &self.append_hub_path)
            .field("username", &self.username)
            .field("password", &"***")
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("connect_delay_secs", &self.connect_delay_secs)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for UpstreamSection {
    fn default() -> Self {
        UpstreamSection {
            url: None,
            append_hub_path: true,
            username: String::new(),
            password: String::new(),
            reconnect_interval_secs: default_reconnect_interval(),
            connect_timeout_secs: default_connect_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            connect_delay_secs: 0,
        }
    }
}

// =============================================================================
// Local Listener Settings
// =============================================================================

/// Settings for the peripheral-facing WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSection {
    /// Bind address (default: 0.0.0.0 for all interfaces).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Listening port.
    #[serde(default = "default_local_port")]
    pub port: u16,

    /// Largest accepted frame, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Frames queued per connection before new ones are dropped.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_local_port() -> u16 {
    81
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_outbox_capacity() -> usize {
    32
}

impl Default for LocalSection {
    fn default() -> Self {
        LocalSection {
            bind_addr: default_bind_addr(),
            port: default_local_port(),
            max_message_bytes: default_max_message_bytes(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl LocalSection {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Registry Settings
// =============================================================================

/// Settings for the device registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Maximum number of registered devices.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Period of the inventory log line (seconds, 0 disables).
    #[serde(default = "default_inventory_interval")]
    pub inventory_log_interval_secs: u64,

    /// Translate `control` commands per device type before forwarding.
    #[serde(default)]
    pub translate_commands: bool,
}

fn default_capacity() -> usize {
    homehub_core::DEFAULT_CAPACITY
}

fn default_inventory_interval() -> u64 {
    60
}

impl Default for RegistrySection {
    fn default() -> Self {
        RegistrySection {
            capacity: default_capacity(),
            inventory_log_interval_secs: default_inventory_interval(),
            translate_commands: false,
        }
    }
}

// =============================================================================
// Main Hub Configuration
// =============================================================================

/// Complete hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub identity.
    #[serde(default)]
    pub hub: HubSection,

    /// Cloud link settings.
    #[serde(default)]
    pub upstream: UpstreamSection,

    /// Peripheral listener settings.
    #[serde(default)]
    pub local: LocalSection,

    /// Registry settings.
    #[serde(default)]
    pub registry: RegistrySection,
}

impl HubConfig {
    /// Creates a new config with defaults and a generated hub id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (hub.toml)
    /// 3. Environment variables
    ///
    /// A generated hub id is saved back to the file so the hub keeps the
    /// same upstream identity across restarts, unless `HOMEHUB_ID` is set.
    pub fn load(config_path: Option<PathBuf>) -> RelayResult<Self> {
        let mut config = Self::default();
        let mut id_generated = true;

        let path = config_path.or_else(Self::default_config_path);
        if let Some(path) = &path {
            if path.exists() {
                info!(?path, "Loading hub config from file");
                let contents = std::fs::read_to_string(path)?;
                let table: toml::Table = toml::from_str(&contents)?;
                id_generated = table
                    .get("hub")
                    .and_then(|hub| hub.get("id"))
                    .is_none();
                config = toml::Value::Table(table).try_into()?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        if id_generated && std::env::var_os("HOMEHUB_ID").is_none() {
            if let Some(path) = path {
                match config.save(Some(path)) {
                    Ok(()) => info!(hub_id = %config.hub.id, "Generated hub id saved"),
                    Err(e) => warn!(error = %e, "Could not persist generated hub id"),
                }
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load hub config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> RelayResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| RelayError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| RelayError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Hub config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RelayResult<()> {
        homehub_core::validation::validate_device_id(&self.hub.id)
            .map_err(|e| RelayError::InvalidConfig(format!("hub id: {}", e)))?;

        if self.upstream.url.is_some() {
            self.upstream_url()?;
        }

        if self.upstream.reconnect_interval_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "reconnect_interval_secs must be greater than 0".into(),
            ));
        }

        if self.upstream.heartbeat_interval_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".into(),
            ));
        }

        if self.registry.capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "capacity must be greater than 0".into(),
            ));
        }

        if self.local.max_message_bytes == 0 || self.local.outbox_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "max_message_bytes and outbox_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("HOMEHUB_ID") {
            debug!(hub_id = %id, "Overriding hub id from environment");
            self.hub.id = id;
        }

        if let Ok(url) = std::env::var("HOMEHUB_UPSTREAM_URL") {
            debug!(url = %url, "Overriding upstream URL from environment");
            self.upstream.url = Some(url);
        }

        if let Ok(username) = std::env::var("HOMEHUB_USERNAME") {
            self.upstream.username = username;
        }

        if let Ok(password) = std::env::var("HOMEHUB_PASSWORD") {
            self.upstream.password = password;
        }

        if let Ok(port) = std::env::var("HOMEHUB_LOCAL_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding local port from environment");
                    self.local.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid HOMEHUB_LOCAL_PORT"),
            }
        }

        if let Ok(capacity) = std::env::var("HOMEHUB_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(c) => self.registry.capacity = c,
                Err(_) => warn!(capacity = %capacity, "Ignoring invalid HOMEHUB_CAPACITY"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "homehub", "hub")
            .map(|dirs| dirs.config_dir().join("hub.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the hub id.
    pub fn hub_id(&self) -> &str {
        &self.hub.id
    }

    /// Returns the full upstream URL, or `None` when the hub is local-only.
    ///
    /// With `append_hub_path` the hub id is appended as `/ws/hub/{id}`.
    pub fn upstream_url(&self) -> RelayResult<Option<Url>> {
        let Some(raw) = self.upstream.url.as_deref() else {
            return Ok(None);
        };

        let mut url = Url::parse(raw)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(RelayError::InvalidUrl(format!(
                "Upstream URL must start with ws:// or wss://, got: {}",
                raw
            )));
        }

        if self.upstream.append_hub_path {
            let base = url.path().trim_end_matches('/').to_string();
            url.set_path(&format!("{}/ws/hub/{}", base, self.hub.id));
        }

        Ok(Some(url))
    }

    /// Fixed reconnect delay.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.upstream.reconnect_interval_secs)
    }

    /// Upstream connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.connect_timeout_secs)
    }

    /// Hub heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.upstream.heartbeat_interval_secs)
    }

    /// Delay before the first upstream connect.
    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.upstream.connect_delay_secs)
    }

    /// Inventory log period, `None` when disabled.
    pub fn inventory_log_interval(&self) -> Option<Duration> {
        match self.registry.inventory_log_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
