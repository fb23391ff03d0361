//! TOML file parsing into typed configuration.
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Load an optional TOML config file.
///
/// A missing file deserializes as an empty document, so every field must
/// carry a serde default.
///
/// # Type Parameters
///
/// - `T`: Target type to deserialize into (must implement `DeserializeOwned`)
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
/// [`ConfigError::InvalidSyntax`] if it cannot be parsed.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return parse_str("", &path.display().to_string());
    }
    load_required(path)
}

/// Load a TOML file that must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or
/// [`ConfigError::InvalidSyntax`] if it cannot be parsed.
pub fn load_required<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, &path.display().to_string())
}

/// Parse TOML text; `file` names the source in errors.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] if the text does not parse into `T`.
pub fn parse_str<T: DeserializeOwned>(content: &str, file: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: file.to_string(),
        message: describe(&e),
    })
}

/// One-line rendering of a TOML error: the message plus the offset it points at.
fn describe(e: &toml::de::Error) -> String {
    let message = e.message().trim_end();
    match e.span() {
        Some(span) => format!("{message} (at byte {})", span.start),
        None => message.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let sample: Sample = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn present_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        std::fs::write(&path, "name = \"x\"\ncount = 3\n").unwrap();
        let sample: Sample = load_config(&path).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "x".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn required_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_required::<Sample>(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn syntax_error_names_the_file() {
        let err = parse_str::<Sample>("count = \"three\"", "sample.toml").unwrap_err();
        let ConfigError::InvalidSyntax { file, message } = err else {
            panic!("expected a syntax error");
        };
        assert_eq!(file, "sample.toml");
        assert!(message.contains("at byte "), "{message}");
    }
}
