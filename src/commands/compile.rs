//! Compile command implementation.
use anyhow::{Context as _, Result, bail};
use std::io::Write as _;
use std::path::Path;

use crate::backend::{ArchiveBackend, ArchiveOptions};
use crate::cli::{CompileOpts, GlobalOpts};
use crate::logging::Logger;

/// Output path meaning "write to stdout".
const STDOUT: &str = "-";

/// Run the compile command.
///
/// # Errors
///
/// Returns an error if loading, compilation or writing the archive fails.
pub fn run(global: &GlobalOpts, opts: &CompileOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, &opts.manifests, log)?;

    let mut archive = setup.settings.archive_options();
    if let Some(mtime) = opts.mtime {
        archive = ArchiveOptions { mtime };
    }

    log.stage("Compiling");
    let artifact = setup
        .compiler
        .compile_to_vec(&ArchiveBackend::new(archive))
        .context("compilation failed")?;
    super::report_warnings(&artifact.warnings, log);

    if opts.output.as_os_str() == STDOUT {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&artifact.bytes)
            .and_then(|()| stdout.flush())
            .context("writing archive to stdout")?;
    } else {
        write_atomically(&opts.output, &artifact.bytes, opts.force)?;
    }

    log.info(&format!("sha256 {}", artifact.fingerprint));
    log.finish(&format!(
        "wrote {} bytes to {}",
        artifact.bytes.len(),
        opts.output.display()
    ));
    Ok(())
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a partial archive.
///
/// # Errors
///
/// Returns an error if `path` exists and `force` is false, or if any
/// filesystem operation fails.
pub fn write_atomically(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("renaming archive into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        write_atomically(&path, b"archive", false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"archive");
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        std::fs::write(&path, "old").unwrap();
        let err = write_atomically(&path, b"new", false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn force_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        std::fs::write(&path, "old").unwrap();
        write_atomically(&path, b"new", true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        write_atomically(&path, b"archive", false).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.tar")]);
    }
}
