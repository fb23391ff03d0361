//! Entries read from the host filesystem.
//!
//! A `from-host` resource takes its kind, content, mode and modification time
//! from `lstat` on a host path.  Symlinks are recorded, never followed.
use std::io;
use std::path::{Path, PathBuf};

use crate::resources::EntrySpec;

/// Failure reading a host entry or expanding a host glob.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HostError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {what} is not supported", path.display())]
    Unsupported { path: PathBuf, what: &'static str },

    #[error("{}: path is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },

    #[error("invalid glob '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Read one host path into an entry, without following a final symlink.
///
/// The entry carries the host's permission bits and modification time; the
/// caller overlays whatever the manifest declares.
#[cfg(unix)]
pub(crate) fn read_entry(source: &Path) -> Result<EntrySpec, HostError> {
    use std::os::unix::fs::{FileTypeExt as _, MetadataExt as _};

    use crate::resources::{DeviceClass, Mode, Permissions};

    let io_error = |e: io::Error| HostError::Io {
        path: source.to_path_buf(),
        source: e,
    };
    let meta = std::fs::symlink_metadata(source).map_err(io_error)?;
    let file_type = meta.file_type();

    let spec = if file_type.is_file() {
        EntrySpec::file(std::fs::read(source).map_err(io_error)?)
    } else if file_type.is_dir() {
        EntrySpec::directory()
    } else if file_type.is_symlink() {
        let target = std::fs::read_link(source)
            .map_err(io_error)?
            .into_os_string()
            .into_string()
            .map_err(|_| HostError::NotUtf8 {
                path: source.to_path_buf(),
            })?;
        EntrySpec::symlink(target)
    } else if file_type.is_fifo() {
        EntrySpec::fifo()
    } else if file_type.is_char_device() || file_type.is_block_device() {
        let class = if file_type.is_char_device() {
            DeviceClass::Char
        } else {
            DeviceClass::Block
        };
        let (major, minor) = device_numbers(source, meta.rdev())?;
        EntrySpec::device(class, major, minor)
    } else {
        let what = if file_type.is_socket() {
            "a socket"
        } else {
            "this file type"
        };
        return Err(HostError::Unsupported {
            path: source.to_path_buf(),
            what,
        });
    };

    // Masked to the permission bits, so always in range.
    let mode = Mode::new(meta.mode() & 0o7777, &source.display().to_string()).ok();
    Ok(EntrySpec {
        permissions: Permissions {
            mode,
            owner: None,
            group: None,
        },
        mtime: Some(u64::try_from(meta.mtime()).unwrap_or(0)),
        ..spec
    })
}

#[cfg(not(unix))]
pub(crate) fn read_entry(source: &Path) -> Result<EntrySpec, HostError> {
    Err(HostError::Unsupported {
        path: source.to_path_buf(),
        what: "reading host entries on this platform",
    })
}

/// Split a raw device number into major and minor.
#[cfg(unix)]
#[allow(clippy::useless_conversion, clippy::unnecessary_fallible_conversions)]
fn device_numbers(source: &Path, rdev: u64) -> Result<(u32, u32), HostError> {
    let unsupported = || HostError::Unsupported {
        path: source.to_path_buf(),
        what: "a device number outside the platform's range",
    };
    let dev = libc::dev_t::try_from(rdev).map_err(|_| unsupported())?;
    let major = u32::try_from(libc::major(dev)).map_err(|_| unsupported())?;
    let minor = u32::try_from(libc::minor(dev)).map_err(|_| unsupported())?;
    Ok((major, minor))
}

/// Expand `pattern` under the host directory `root`.
///
/// Returns `(relative, host)` pairs sorted by the `/`-separated relative
/// path.  `root` itself is never a match.
pub(crate) fn expand(root: &Path, pattern: &str) -> Result<Vec<(String, PathBuf)>, HostError> {
    let root_text = root.to_str().ok_or_else(|| HostError::NotUtf8 {
        path: root.to_path_buf(),
    })?;
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(root_text.trim_end_matches('/')),
        pattern.trim_start_matches('/')
    );
    let paths = glob::glob(&full).map_err(|source| HostError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for entry in paths {
        let host = entry.map_err(|e| HostError::Io {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        let relative = relative_path(root, &host)?;
        if !relative.is_empty() {
            matches.push((relative, host));
        }
    }
    matches.sort();
    tracing::debug!(
        "glob '{pattern}' under {} matched {} path(s)",
        root.display(),
        matches.len()
    );
    Ok(matches)
}

fn relative_path(root: &Path, host: &Path) -> Result<String, HostError> {
    let relative = host
        .strip_prefix(root)
        .map_err(|_| HostError::Unsupported {
            path: host.to_path_buf(),
            what: "a glob match outside the source tree",
        })?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    parts
        .map(|parts| parts.join("/"))
        .ok_or_else(|| HostError::NotUtf8 {
            path: host.to_path_buf(),
        })
}

#[cfg(all(test, unix))]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt as _;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::resources::Entry;

    fn touch(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    // -----------------------------------------------------------------------
    // read_entry
    // -----------------------------------------------------------------------

    #[test]
    fn regular_file_keeps_content_mode_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "motd", b"hello\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000))
            .unwrap();

        let spec = read_entry(&path).unwrap();
        assert_eq!(
            spec.entry,
            Entry::File {
                content: b"hello\n".to_vec()
            }
        );
        assert_eq!(spec.permissions.mode.unwrap().bits(), 0o640);
        assert_eq!(spec.permissions.owner, None);
        assert_eq!(spec.mtime, Some(1_600_000_000));
        assert_eq!(spec.atime, None);
    }

    #[test]
    fn symlink_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "vim", b"#!");
        let link = dir.path().join("vi");
        std::os::unix::fs::symlink("vim", &link).unwrap();

        let spec = read_entry(&link).unwrap();
        assert_eq!(
            spec.entry,
            Entry::Symlink {
                target: "vim".to_string()
            }
        );
    }

    #[test]
    fn directory_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("conf.d")).unwrap();
        let spec = read_entry(&dir.path().join("conf.d")).unwrap();
        assert_eq!(spec.entry, Entry::Directory);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn character_device_numbers() {
        use crate::resources::DeviceClass;

        let spec = read_entry(Path::new("/dev/null")).unwrap();
        assert_eq!(
            spec.entry,
            Entry::Device {
                class: DeviceClass::Char,
                major: 1,
                minor: 3
            }
        );
    }

    #[test]
    fn socket_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let err = read_entry(&path).unwrap_err();
        assert!(matches!(err, HostError::Unsupported { what: "a socket", .. }), "{err}");
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_entry(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, HostError::Io { .. }), "{err}");
    }

    // -----------------------------------------------------------------------
    // expand
    // -----------------------------------------------------------------------

    #[test]
    fn glob_matches_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "nginx/sites/default.conf", b"");
        touch(dir.path(), "nginx/nginx.conf", b"");
        touch(dir.path(), "nginx/mime.types", b"");

        let found: Vec<String> = expand(dir.path(), "**/*.conf")
            .unwrap()
            .into_iter()
            .map(|(relative, _)| relative)
            .collect();
        assert_eq!(found, vec!["nginx/nginx.conf", "nginx/sites/default.conf"]);
    }

    #[test]
    fn glob_host_paths_point_into_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let motd = touch(dir.path(), "etc/motd", b"hi");
        let found = expand(dir.path(), "/etc/*").unwrap();
        assert_eq!(found, vec![("etc/motd".to_string(), motd)]);
    }

    #[test]
    fn glob_root_with_metacharacters_is_literal() {
        let dir = tempfile::Builder::new()
            .prefix("tree[1]")
            .tempdir()
            .unwrap();
        touch(dir.path(), "a.conf", b"");
        let found = expand(dir.path(), "*.conf").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "a.conf");
    }

    #[test]
    fn invalid_glob_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = expand(dir.path(), "a/***").unwrap_err();
        assert!(matches!(err, HostError::Pattern { .. }), "{err}");
        assert!(err.to_string().contains("a/***"));
    }
}
