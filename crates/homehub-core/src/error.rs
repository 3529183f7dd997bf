//! # Error Types
//!
//! Domain-specific error types for homehub-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  homehub-core errors (this file)                                       │
//! │  ├── CoreError        - Registry failures                              │
//! │  └── ValidationError  - Empty or malformed ids and types               │
//! │                                                                         │
//! │  homehub-relay errors (separate crate)                                 │
//! │  ├── DecodeError      - Malformed or untyped wire payloads             │
//! │  └── RelayError       - Transport, config, routing failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → RelayError → log line             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these errors ever reach a peripheral. The router logs them and
//! drops the offending message.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Device registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The registry already holds `capacity` devices and the id is new.
    ///
    /// ## When This Occurs
    /// - An eleventh distinct device sends `registration` to a hub with the
    ///   default capacity of 10
    /// - Re-registration of an id that is already present never hits this
    #[error("Device registry is full (capacity {capacity})")]
    RegistryFull { capacity: usize },

    /// No device with this id has registered.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for values supplied by peripherals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., control characters in an id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
