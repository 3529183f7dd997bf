//! # Relay Error Types
//!
//! Error types for the relay engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Relay Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  Decode(DecodeError)    │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │  Timeout, Bind  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Routing      │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  LinkDown       │  │  ChannelError   │                              │
//! │  │  Core(CoreError)│  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Routing and protocol errors are never sent back to a peripheral. The
//! router logs them and drops the message.

use homehub_core::CoreError;
use thiserror::Error;

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Decode Error
// =============================================================================

/// Reasons an inbound text frame could not become a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame exceeds the configured size bound.
    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// Not well-formed JSON.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Well-formed JSON, but not an object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// Object without a string `type` field.
    #[error("Message has no type field")]
    MissingType,

    /// `type` is not one this direction understands.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Known `type`, but required fields are missing or mistyped.
    #[error("Invalid {kind} message: {reason}")]
    InvalidFields { kind: String, reason: String },
}

// =============================================================================
// Relay Error
// =============================================================================

/// Relay error type covering every failure in this crate.
#[derive(Debug, Error)]
pub enum RelayError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid hub configuration.
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    /// Invalid upstream URL.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish the upstream WebSocket connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Upstream link dropped.
    #[error("Disconnected from upstream")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Local listener could not bind.
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Inbound frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Failed to serialize an outbound message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Routing Errors
    // =========================================================================
    /// Upstream relay attempted while the session is not authenticated.
    #[error("Upstream link is not authenticated")]
    LinkDown,

    /// Registry error.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Agent is shutting down.
    #[error("Hub agent is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RelayError::Disconnected,
            WsError::Protocol(p) => RelayError::WebSocketError(p.to_string()),
            WsError::Io(io) => RelayError::ConnectionFailed(io.to_string()),
            other => RelayError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for RelayError {
    fn from(err: toml::ser::Error) -> Self {
        RelayError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl RelayError {
    /// Returns true if the upstream transport should keep retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectionFailed(_)
                | RelayError::Disconnected
                | RelayError::Timeout(_)
                | RelayError::WebSocketError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidConfig(_)
                | RelayError::InvalidUrl(_)
                | RelayError::ConfigLoadFailed(_)
                | RelayError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came from the wire format.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            RelayError::Decode(_) | RelayError::SerializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(RelayError::ConnectionFailed("refused".into()).is_retryable());
        assert!(RelayError::Disconnected.is_retryable());
        assert!(RelayError::Timeout(10).is_retryable());

        assert!(!RelayError::InvalidConfig("bad".into()).is_retryable());
        assert!(!RelayError::LinkDown.is_retryable());
        assert!(!RelayError::Decode(DecodeError::MissingType).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert!(RelayError::InvalidUrl("http://x".into()).is_config_error());
        assert!(RelayError::Decode(DecodeError::NotAnObject).is_protocol_error());
        assert!(!RelayError::Core(CoreError::UnknownDevice("x".into())).is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::from(DecodeError::InvalidFields {
            kind: "registration".into(),
            reason: "missing field `deviceId`".into(),
        });
        assert_eq!(
            err.to_string(),
            "Decode error: Invalid registration message: missing field `deviceId`"
        );

        let err = RelayError::from(CoreError::RegistryFull { capacity: 10 });
        assert_eq!(err.to_string(), "Device registry is full (capacity 10)");
    }
}
