//! Typed error variants for backend validation and rendering.
use std::io;

use thiserror::Error;

use crate::resources::TargetPath;

/// A resolved value the backend cannot encode, or a failed write.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The value exceeds a limit of the output format.
    #[error("cannot encode '{path}': {reason}")]
    Unencodable {
        /// Offending path.
        path: TargetPath,
        /// Which limit was exceeded.
        reason: String,
    },

    /// Writing an entry to the sink failed.
    #[error("failed to write '{path}'")]
    Io {
        /// Entry being written.
        path: TargetPath,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Writing the end-of-stream marker failed.
    #[error("failed to finish the output stream")]
    Finish(#[source] io::Error),

    /// Structured output could not be serialized.
    #[error("failed to serialize output")]
    Serialize(#[from] serde_json::Error),
}

impl RenderError {
    /// Shorthand for [`RenderError::Unencodable`].
    #[must_use]
    pub fn unencodable(path: &TargetPath, reason: impl Into<String>) -> Self {
        Self::Unencodable {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`RenderError::Io`].
    #[must_use]
    pub fn io(path: &TargetPath, source: io::Error) -> Self {
        Self::Io {
            path: path.clone(),
            source,
        }
    }
}

/// The sequence contains an operation the backend cannot represent.
///
/// Always raised from validation, before any byte is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("operation '{operation}' at '{path}' is not supported by the {backend} backend")]
pub struct UnsupportedOperation {
    /// Name of the operation (e.g. `"remove"`).
    pub operation: &'static str,
    /// Path of the offending node.
    pub path: TargetPath,
    /// Name of the backend.
    pub backend: &'static str,
}

/// Anything a backend can fail with.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Encoding or write failure.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Operation the backend cannot represent.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperation),
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(raw: &str) -> TargetPath {
        TargetPath::parse(raw).unwrap()
    }

    #[test]
    fn unsupported_operation_display() {
        let e = UnsupportedOperation {
            operation: "remove",
            path: p("/etc/old.conf"),
            backend: "archive",
        };
        assert_eq!(
            e.to_string(),
            "operation 'remove' at '/etc/old.conf' is not supported by the archive backend"
        );
    }

    #[test]
    fn unencodable_display() {
        let e = RenderError::unencodable(&p("/etc/x"), "xattr value too large");
        assert_eq!(e.to_string(), "cannot encode '/etc/x': xattr value too large");
    }

    #[test]
    fn io_error_keeps_source() {
        let e = RenderError::io(&p("/etc/x"), io::Error::other("disk full"));
        let source = std::error::Error::source(&e).unwrap();
        assert_eq!(source.to_string(), "disk full");
    }

    #[test]
    fn backend_error_is_transparent() {
        let e: BackendError = RenderError::unencodable(&p("/x"), "too long").into();
        assert_eq!(e.to_string(), "cannot encode '/x': too long");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn backend_errors_are_send_sync() {
        assert_send_sync::<RenderError>();
        assert_send_sync::<UnsupportedOperation>();
        assert_send_sync::<BackendError>();
    }
}
