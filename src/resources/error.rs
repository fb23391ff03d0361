//! Validation failures raised while constructing resource declarations.
//!
//! [`InvalidDeclaration`] is the only error the resource model produces.  It
//! is never recovered from: the offending declaration is reported with its
//! path and the field that failed validation.

use thiserror::Error;

/// A declaration violated one of the resource model's constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid declaration for '{path}': {field}: {reason}")]
pub struct InvalidDeclaration {
    /// Path of the declaration as given by the caller (before normalization).
    pub path: String,
    /// Name of the field that failed validation (e.g. `"mode"`).
    pub field: &'static str,
    /// Human-readable explanation of the violated constraint.
    pub reason: String,
}

impl InvalidDeclaration {
    /// Create a new validation error.
    #[must_use]
    pub fn new(path: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field,
            reason: reason.into(),
        }
    }
}
