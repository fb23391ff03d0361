pub mod compile;
pub mod completions;
pub mod plan;
pub mod version;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use crate::cli::GlobalOpts;
use crate::compiler::{CompileOptions, Compiler};
use crate::config::{SETTINGS_FILE, Settings, manifest, toml_loader};
use crate::graph::BuildWarning;
use crate::logging::Logger;

/// Shared state produced by the common command setup sequence.
///
/// Loads settings and manifests so that each command does not have to
/// repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Settings as loaded, before command-line overrides.
    pub settings: Settings,
    /// Compiler holding every manifest in command-line order.
    pub compiler: Compiler,
}

impl CommandSetup {
    /// Load settings and every manifest, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file or any manifest cannot be
    /// loaded.
    pub fn init(global: &GlobalOpts, manifests: &[PathBuf], log: &Logger) -> Result<Self> {
        let settings = load_settings(global.config.as_deref())?;
        let mut options = settings.compile_options();
        if global.strict {
            options = CompileOptions::strict();
        }
        log.debug(&format!("merge policy: {:?}", options.build.strictness));

        log.stage("Loading manifests");
        let mut compiler = Compiler::new(options);
        for path in manifests {
            let loaded = manifest::load(path)
                .with_context(|| format!("loading manifest {}", path.display()))?;
            log.debug(&format!(
                "{}: manifest '{}', {} declaration(s)",
                path.display(),
                loaded.id(),
                loaded.len()
            ));
            compiler.add_manifest(loaded);
        }
        log.info(&format!("loaded {} manifest(s)", compiler.manifest_count()));

        Ok(Self { settings, compiler })
    }
}

/// Load the settings file named on the command line, or the default one if
/// it exists.
fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => toml_loader::load_required(path)
            .with_context(|| format!("loading settings {}", path.display())),
        None => Settings::load(Path::new(SETTINGS_FILE)).context("loading settings"),
    }
}

/// Log every build warning.
pub fn report_warnings(warnings: &[BuildWarning], log: &Logger) {
    for warning in warnings {
        log.warn(&warning.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::captured_logger;
    use crate::resources::{Provenance, TargetPath};

    #[test]
    fn explicit_settings_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn strict_flag_overrides_settings() {
        let (log, _events, _guard) = captured_logger();
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.toml");
        std::fs::write(&settings, "[compiler]\nstrict = false\n").unwrap();
        let global = GlobalOpts {
            config: Some(settings),
            strict: true,
        };
        let setup = CommandSetup::init(&global, &[], &log).unwrap();
        assert!(!setup.settings.compiler.strict);
        assert_eq!(setup.compiler.manifest_count(), 0);
    }

    #[test]
    fn missing_manifest_is_reported_with_path() {
        let (log, _events, _guard) = captured_logger();
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalOpts {
            config: None,
            strict: false,
        };
        let missing = dir.path().join("nope.toml");
        let err = CommandSetup::init(&global, &[missing], &log).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }

    #[test]
    fn warnings_are_logged() {
        let (log, events, _guard) = captured_logger();
        let warning = BuildWarning::new(
            TargetPath::parse("/etc/motd").unwrap(),
            "overridden",
            vec![Provenance::new("a", 0), Provenance::new("b", 0)],
        );
        report_warnings(&[warning], &log);
        assert_eq!(log.warning_count(), 1);
        assert_eq!(
            events.lock().unwrap().clone(),
            vec!["WARN /etc/motd: overridden (a#0, b#0)"]
        );
    }
}
