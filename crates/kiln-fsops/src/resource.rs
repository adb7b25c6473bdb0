//! Resource descriptors: the filesystem objects a subtask acts on.

use kiln_config::{ResourceKind as SpecKind, ResourceSpec};

use crate::hooks::Replacement;

/// Kind of filesystem object a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A single regular file.
    File,
    /// A directory, processed recursively.
    Directory,
    /// The regular files directly inside a directory, listed when the subtask runs.
    GlobSet,
}

impl ResourceKind {
    /// Short label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "dir",
            Self::GlobSet => "files",
        }
    }
}

impl From<SpecKind> for ResourceKind {
    fn from(kind: SpecKind) -> Self {
        match kind {
            SpecKind::File => Self::File,
            SpecKind::Dir => Self::Directory,
            SpecKind::Files => Self::GlobSet,
        }
    }
}

/// One filesystem object to operate on, relative to a subtask's aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Object kind.
    pub kind: ResourceKind,
    /// Name relative to the source alias.
    pub name: String,
    /// Destination-relative name, when different from `name`.
    pub rename: Option<String>,
    /// Whether an existing destination may be overwritten.
    pub overwrite: bool,
}

impl ResourceDescriptor {
    /// Descriptor with no rename that never overwrites.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            rename: None,
            overwrite: false,
        }
    }

    /// Shorthand for a single-file descriptor.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::File, name)
    }

    /// Shorthand for a directory descriptor.
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Directory, name)
    }

    /// Shorthand for a glob-set descriptor.
    #[must_use]
    pub fn files(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::GlobSet, name)
    }

    /// Set the destination-relative name.
    #[must_use]
    pub fn renamed(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }

    /// Allow overwriting an existing destination.
    #[must_use]
    pub const fn overwriting(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Destination-relative name: `rename` when present, `name` otherwise.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }

    /// Copy of the descriptor with `replacement` applied to both names.
    #[must_use]
    pub fn replaced(&self, replacement: Option<&Replacement>) -> Self {
        let Some(replacement) = replacement else {
            return self.clone();
        };
        Self {
            kind: self.kind,
            name: replacement.apply(&self.name),
            rename: self.rename.as_deref().map(|value| replacement.apply(value)),
            overwrite: self.overwrite,
        }
    }
}

impl From<&ResourceSpec> for ResourceDescriptor {
    fn from(spec: &ResourceSpec) -> Self {
        Self {
            kind: spec.kind.into(),
            name: spec.name.clone(),
            rename: spec.custom.clone(),
            overwrite: spec.overwrite,
        }
    }
}
