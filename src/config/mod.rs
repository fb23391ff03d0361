//! File-based configuration: manifests and tool settings.
mod host;
pub mod manifest;
pub mod toml_loader;

use serde::Deserialize;
use std::path::Path;

use crate::backend::ArchiveOptions;
use crate::compiler::CompileOptions;
use crate::error::ConfigError;
use crate::graph::{BuildOptions, Strictness};

/// Default settings file name, looked up in the working directory.
pub const SETTINGS_FILE: &str = "confbundler.toml";

/// Tool settings from `confbundler.toml`.
///
/// Every field is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `[compiler]` table.
    pub compiler: CompilerSettings,
    /// `[archive]` table.
    pub archive: ArchiveSettings,
}

/// `[compiler]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerSettings {
    /// Treat overrides that change a value as conflicts.
    pub strict: bool,
}

/// `[archive]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSettings {
    /// Modification time for entries that do not declare one.
    pub mtime: u64,
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        toml_loader::load_config(path)
    }

    /// Compiler options derived from these settings.
    #[must_use]
    pub const fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            build: BuildOptions {
                strictness: if self.compiler.strict {
                    Strictness::Strict
                } else {
                    Strictness::Lenient
                },
            },
        }
    }

    /// Archive backend options derived from these settings.
    #[must_use]
    pub const fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            mtime: self.archive.mtime,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) mod test_helpers {
    use std::path::PathBuf;

    /// Write `content` to `manifest.toml` in a fresh temporary directory.
    pub fn write_temp_toml(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("manifest.toml");
        std::fs::write(&path, content).expect("failed to write temp toml");
        (dir, path)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use test_helpers::write_temp_toml;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.compile_options(), CompileOptions::default());
        assert_eq!(settings.archive_options().mtime, 0);
    }

    #[test]
    fn settings_are_parsed() {
        let (_dir, path) = write_temp_toml("[compiler]\nstrict = true\n\n[archive]\nmtime = 1700000000\n");
        let settings = Settings::load(&path).unwrap();
        assert!(settings.compiler.strict);
        assert_eq!(settings.compile_options(), CompileOptions::strict());
        assert_eq!(settings.archive_options().mtime, 1_700_000_000);
    }

    #[test]
    fn unknown_setting_is_rejected() {
        let (_dir, path) = write_temp_toml("[compiler]\nparallel = true\n");
        assert!(matches!(
            Settings::load(&path).unwrap_err(),
            ConfigError::InvalidSyntax { .. }
        ));
    }
}
