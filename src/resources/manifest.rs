//! In-memory manifests: ordered declaration lists with a shared identity.
use super::{InvalidDeclaration, Provenance, Resource, ResourceDeclaration};

/// An ordered list of declarations from one source.
///
/// Pushing assigns each declaration its `declared-order` (position within the
/// manifest).  Manifests are concatenated in caller order before compilation,
/// which makes that order the authoritative tie-break across manifests.
///
/// # Examples
///
/// ```
/// use confbundler::resources::{EntrySpec, Manifest, Xattr};
///
/// let mut manifest = Manifest::new("ssh");
/// manifest.push("/etc/ssh", EntrySpec::directory().with_mode(0o755)).unwrap();
/// manifest.push("/etc/ssh/sshd_config", EntrySpec::file("B").with_mode(0o600)).unwrap();
/// manifest.push("/etc/ssh/sshd_config", Xattr::new("user.managed", "true")).unwrap();
/// assert_eq!(manifest.len(), 3);
/// assert_eq!(manifest.declarations()[2].provenance().order, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    id: String,
    declarations: Vec<ResourceDeclaration>,
}

impl Manifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            declarations: Vec::new(),
        }
    }

    /// Manifest identifier used in provenance.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Validate and append a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] if the declaration is malformed.
    pub fn push(
        &mut self,
        path: &str,
        resource: impl Into<Resource>,
    ) -> Result<(), InvalidDeclaration> {
        let provenance = Provenance::new(self.id.clone(), self.declarations.len());
        let decl = ResourceDeclaration::new(path, resource, provenance)?;
        self.declarations.push(decl);
        Ok(())
    }

    /// Validate and append a declaration with explicit dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] if the declaration or any required path
    /// is malformed.
    pub fn push_requiring<I, S>(
        &mut self,
        path: &str,
        resource: impl Into<Resource>,
        requires: I,
    ) -> Result<(), InvalidDeclaration>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let provenance = Provenance::new(self.id.clone(), self.declarations.len());
        let decl = ResourceDeclaration::new(path, resource, provenance)?.with_requires(requires)?;
        self.declarations.push(decl);
        Ok(())
    }

    /// Declarations in push order.
    #[must_use]
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns `true` if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Consume the manifest, yielding its declarations.
    #[must_use]
    pub fn into_declarations(self) -> Vec<ResourceDeclaration> {
        self.declarations
    }
}

impl IntoIterator for Manifest {
    type Item = ResourceDeclaration;
    type IntoIter = std::vec::IntoIter<ResourceDeclaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.declarations.into_iter()
    }
}

/// Concatenate manifests in the given order.
#[must_use]
pub fn concat(manifests: impl IntoIterator<Item = Manifest>) -> Vec<ResourceDeclaration> {
    manifests.into_iter().flatten().collect()
}
