//! Permission bits and ownership.
use std::fmt;

use serde::Serialize;

use super::error::InvalidDeclaration;

/// Largest valid permission value (rwx for all classes plus setuid, setgid
/// and sticky).
pub const MODE_MAX: u32 = 0o7777;

/// Minimum length for octal mode strings.
const OCTAL_MODE_MIN_LEN: usize = 3;

/// Maximum length for octal mode strings.
const OCTAL_MODE_MAX_LEN: usize = 4;

/// Validated permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Mode(u32);

impl Mode {
    /// Wrap raw bits, rejecting anything above [`MODE_MAX`].
    ///
    /// `path` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] (field `mode`) if `bits` is out of range.
    pub fn new(bits: u32, path: &str) -> Result<Self, InvalidDeclaration> {
        if bits > MODE_MAX {
            return Err(InvalidDeclaration::new(
                path,
                "mode",
                format!("mode {bits:o} exceeds {MODE_MAX:o}"),
            ));
        }
        Ok(Self(bits))
    }

    /// Parse an octal mode string such as `"644"` or `"0755"`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] if the string is not 3 or 4 octal digits.
    pub fn parse_octal(mode: &str, path: &str) -> Result<Self, InvalidDeclaration> {
        if !mode.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidDeclaration::new(
                path,
                "mode",
                format!("invalid octal mode '{mode}': must contain only digits"),
            ));
        }
        if mode.len() < OCTAL_MODE_MIN_LEN || mode.len() > OCTAL_MODE_MAX_LEN {
            return Err(InvalidDeclaration::new(
                path,
                "mode",
                format!(
                    "invalid mode length '{mode}': must be {OCTAL_MODE_MIN_LEN} or {OCTAL_MODE_MAX_LEN} digits"
                ),
            ));
        }
        if let Some(c) = mode.chars().find(|&c| c > '7') {
            return Err(InvalidDeclaration::new(
                path,
                "mode",
                format!("invalid octal digit '{c}' in mode '{mode}'"),
            ));
        }
        let bits = u32::from_str_radix(mode, 8)
            .map_err(|e| InvalidDeclaration::new(path, "mode", e.to_string()))?;
        Self::new(bits, path)
    }

    /// The raw permission bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// A user or group, by name, numeric id, or both.
///
/// When both are given, extractors that honour symbolic names prefer the name
/// and fall back to the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Principal {
    /// Symbolic name (e.g. `root`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Numeric id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Principal {
    /// A principal known only by name.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            id: None,
        }
    }

    /// A principal known only by numeric id.
    #[must_use]
    pub const fn id(id: u64) -> Self {
        Self { name: None, id: Some(id) }
    }

    /// A principal with both a name and an id.
    #[must_use]
    pub fn named(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: Some(name.into()),
            id: Some(id),
        }
    }

    fn validate(&self, path: &str, field: &'static str) -> Result<(), InvalidDeclaration> {
        match &self.name {
            None if self.id.is_none() => Err(InvalidDeclaration::new(
                path,
                field,
                "needs a name, an id, or both",
            )),
            Some(name) if name.is_empty() => {
                Err(InvalidDeclaration::new(path, field, "name is empty"))
            }
            Some(name) if name.contains('\0') => {
                Err(InvalidDeclaration::new(path, field, "name contains a NUL byte"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.id) {
            (Some(name), Some(id)) => write!(f, "{name}({id})"),
            (Some(name), None) => f.write_str(name),
            (None, Some(id)) => write!(f, "{id}"),
            (None, None) => f.write_str("-"),
        }
    }
}

/// Mode and ownership, each optional.
///
/// Used both inline on primary entries and as the payload of a
/// permission-set declaration.  Unset fields fall back to whatever the
/// backend considers the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Permissions {
    /// Permission bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Owning user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Principal>,
    /// Owning group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Principal>,
}

impl Permissions {
    /// No fields set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode from raw bits.  Range is checked when the declaration is
    /// constructed, see [`ResourceDeclaration::new`](super::ResourceDeclaration::new).
    #[must_use]
    pub const fn with_mode(mut self, bits: u32) -> Self {
        self.mode = Some(Mode(bits));
        self
    }

    /// Set the owning user.
    #[must_use]
    pub fn with_owner(mut self, owner: Principal) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Set the owning group.
    #[must_use]
    pub fn with_group(mut self, group: Principal) -> Self {
        self.group = Some(group);
        self
    }

    /// Returns `true` when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mode.is_none() && self.owner.is_none() && self.group.is_none()
    }

    /// Overlay `other` on top of `self`: every field set in `other` wins.
    #[must_use]
    pub fn overlaid(&self, other: &Self) -> Self {
        Self {
            mode: other.mode.or(self.mode),
            owner: other.owner.clone().or_else(|| self.owner.clone()),
            group: other.group.clone().or_else(|| self.group.clone()),
        }
    }

    pub(crate) fn validate(&self, path: &str) -> Result<(), InvalidDeclaration> {
        if let Some(mode) = self.mode {
            Mode::new(mode.bits(), path)?;
        }
        if let Some(owner) = &self.owner {
            owner.validate(path, "owner")?;
        }
        if let Some(group) = &self.group {
            group.validate(path, "group")?;
        }
        Ok(())
    }
}
