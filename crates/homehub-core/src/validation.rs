//! # Validation Module
//!
//! Checks applied to peripheral-supplied values before they touch the
//! registry. Lengths are not checked here: the codec's frame size bound
//! already limits every field, and types and statuses are open-ended.
//!
//! ## Usage
//! ```rust
//! use homehub_core::validation::{validate_device_id, validate_device_type};
//!
//! assert!(validate_device_id("switch-3C61").is_ok());
//! assert!(validate_device_id("").is_err());
//! assert!(validate_device_type("smart_window_blind_with_tilt").is_ok());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a device id.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - No control characters
pub fn validate_device_id(id: &str) -> ValidationResult<()> {
    validate_token("deviceId", id)
}

/// Validates a device type name.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - No control characters
pub fn validate_device_type(kind: &str) -> ValidationResult<()> {
    validate_token("deviceType", kind)
}

fn validate_token(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("smoke-AABBCC").is_ok());
        assert!(validate_device_id(&"x".repeat(200)).is_ok());
        assert!(matches!(
            validate_device_id("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_device_id("bad\nid"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_device_type() {
        assert!(validate_device_type("window_blind").is_ok());
        assert!(validate_device_type("smart_window_blind_with_tilt_v2_xyz").is_ok());
        assert!(validate_device_type("").is_err());
        assert!(validate_device_type("blind\t2").is_err());
    }
}
