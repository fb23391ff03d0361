//! Backend contract: turn a resolved sequence into an output stream.
//!
//! Backends are independent types selected by the caller.  Every backend
//! must be deterministic: rendering the same [`ResolvedSequence`] twice
//! yields byte-identical output.
pub mod archive;
pub mod error;
pub mod pax;
pub mod plan;

use std::fmt::Write as _;
use std::io::Write;

use sha2::{Digest, Sha256};

use crate::graph::ResolvedSequence;

pub use archive::{ArchiveBackend, ArchiveOptions};
pub use error::{BackendError, RenderError, UnsupportedOperation};
pub use plan::{PlanBackend, PlanFormat};

/// A serialization target for resolved sequences.
pub trait Backend {
    /// Short name used in diagnostics (e.g. `"archive"`).
    fn name(&self) -> &'static str;

    /// Check that every node can be represented, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unsupported`] for operations the backend cannot
    /// express and [`BackendError::Render`] for values beyond its limits.
    fn validate(&self, sequence: &ResolvedSequence) -> Result<(), BackendError>;

    /// Serialize the sequence into `sink`.
    ///
    /// Implementations call [`validate`](Self::validate) first, so a failing
    /// sequence never produces partial output.
    ///
    /// # Errors
    ///
    /// Returns any validation error, or [`RenderError`] if writing fails.
    fn render(&self, sequence: &ResolvedSequence, sink: &mut dyn Write)
    -> Result<(), BackendError>;
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
