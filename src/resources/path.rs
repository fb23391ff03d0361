//! Normalized absolute paths on the target filesystem.
use std::fmt;

use serde::Serialize;

use super::error::InvalidDeclaration;

/// An absolute, normalized path on the target machine.
///
/// Paths are the identity key of the resource graph, so two spellings of the
/// same location (`/etc//ssh/`, `/etc/./ssh`) must compare equal.  Parsing
/// collapses repeated separators, drops `.` segments and any trailing slash,
/// and rejects `..` outright.
///
/// Ordering is byte-lexicographic on the normalized string.
///
/// # Examples
///
/// ```
/// use confbundler::resources::TargetPath;
///
/// let path = TargetPath::parse("/etc//ssh/./sshd_config").unwrap();
/// assert_eq!(path.as_str(), "/etc/ssh/sshd_config");
/// assert_eq!(path.parent().unwrap().as_str(), "/etc/ssh");
/// assert!(TargetPath::parse("/etc/../root").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TargetPath(String);

impl TargetPath {
    /// The filesystem root, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a raw path.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] (field `path`) if the path is empty,
    /// relative, contains a NUL byte, or contains a `..` segment.
    pub fn parse(raw: &str) -> Result<Self, InvalidDeclaration> {
        if raw.is_empty() {
            return Err(InvalidDeclaration::new(raw, "path", "path is empty"));
        }
        if !raw.starts_with('/') {
            return Err(InvalidDeclaration::new(raw, "path", "path must be absolute"));
        }
        if raw.contains('\0') {
            return Err(InvalidDeclaration::new(raw, "path", "path contains a NUL byte"));
        }

        let mut normalized = String::with_capacity(raw.len());
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(InvalidDeclaration::new(
                        raw,
                        "path",
                        "path must not contain '..' segments",
                    ));
                }
                _ => {
                    normalized.push('/');
                    normalized.push_str(segment);
                }
            }
        }

        if normalized.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(normalized))
    }

    /// The normalized path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The containing directory, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0.get(..idx)?.to_string())),
            None => None,
        }
    }

    /// All proper ancestors, nearest first, ending with the root.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            out.push(path);
        }
        out
    }

    /// Returns `true` if `self` lies strictly beneath `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        if self == other {
            return false;
        }
        if other.is_root() {
            return true;
        }
        self.0
            .strip_prefix(other.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Last path segment; empty for the root.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The path as stored in an archive: relative to the extraction root.
    ///
    /// The root itself becomes `.`.
    #[must_use]
    pub fn relative(&self) -> &str {
        if self.is_root() {
            "."
        } else {
            self.0.trim_start_matches('/')
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn p(raw: &str) -> TargetPath {
        TargetPath::parse(raw).unwrap()
    }

    #[test]
    fn normalizes_redundant_segments() {
        assert_eq!(p("/etc//ssh/").as_str(), "/etc/ssh");
        assert_eq!(p("/etc/./ssh").as_str(), "/etc/ssh");
        assert_eq!(p("///").as_str(), "/");
        assert_eq!(p("/./").as_str(), "/");
    }

    #[test]
    fn rejects_relative_paths() {
        let err = TargetPath::parse("etc/ssh").unwrap_err();
        assert_eq!(err.field, "path");
        assert!(err.reason.contains("absolute"));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(TargetPath::parse("").is_err());
    }

    #[test]
    fn rejects_traversal() {
        let err = TargetPath::parse("/etc/../shadow").unwrap_err();
        assert!(err.reason.contains(".."));
    }

    #[test]
    fn rejects_nul() {
        assert!(TargetPath::parse("/etc/\0x").is_err());
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert_eq!(p("/etc/..hidden").as_str(), "/etc/..hidden");
        assert_eq!(p("/etc/.profile").as_str(), "/etc/.profile");
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(p("/etc").parent(), Some(TargetPath::root()));
        assert_eq!(TargetPath::root().parent(), None);
    }

    #[test]
    fn ancestors_nearest_first() {
        let ancestors: Vec<String> = p("/a/b/c")
            .ancestors()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ancestors, vec!["/a/b", "/a", "/"]);
    }

    #[test]
    fn descendant_checks_segment_boundary() {
        assert!(p("/etc/ssh/sshd_config").is_descendant_of(&p("/etc/ssh")));
        assert!(!p("/etc/sshd").is_descendant_of(&p("/etc/ssh")));
        assert!(!p("/etc/ssh").is_descendant_of(&p("/etc/ssh")));
        assert!(p("/etc").is_descendant_of(&TargetPath::root()));
    }

    #[test]
    fn relative_strips_leading_slash() {
        assert_eq!(p("/etc/motd").relative(), "etc/motd");
        assert_eq!(TargetPath::root().relative(), ".");
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(p("/etc/motd").file_name(), "motd");
        assert_eq!(TargetPath::root().file_name(), "");
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut paths = vec![p("/a/b"), p("/a-b"), p("/a")];
        paths.sort();
        let names: Vec<&str> = paths.iter().map(TargetPath::as_str).collect();
        assert_eq!(names, vec!["/a", "/a-b", "/a/b"]);
    }
}
