//! VeriXOS shared errors
//!
//! Generic validation error used by the value types in [`crate::types`] and by
//! any downstream crate (such as `verixos-thermal`) composing it into a richer,
//! domain-specific error enum via `#[from]`.

use thiserror::Error;

/// Validation error for a single malformed field on a shared value type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("validation error on '{field}': {message}")]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
