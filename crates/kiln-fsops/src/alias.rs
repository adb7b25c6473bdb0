//! Path alias table and ranked search paths.
//!
//! # Design
//! - Aliases are collected in a mutable [`AliasTableBuilder`] and frozen into a
//!   cheap-to-clone [`PathAliasTable`]; subtasks only ever see the frozen form.
//! - Well-known roots (`res`, `src`, `user`) and the per-app roots derived from
//!   them are inserted by helpers so every task agrees on their layout.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Resource root.
pub const ALIAS_RES: &str = "res";
/// Source root.
pub const ALIAS_SRC: &str = "src";
/// Application sources below the source root (`src/apps`).
pub const ALIAS_SRC2: &str = "src2";
/// Per-user data root.
pub const ALIAS_USER: &str = "user";
/// Per-app resource root (`<app>-res`, sibling of `res`).
pub const ALIAS_APP_RES: &str = "app_res";
/// Per-app source root (`<app>-src`, sibling of `src`).
pub const ALIAS_APP_SRC: &str = "app_src";
/// Per-app application sources (`app_src/<app>`).
pub const ALIAS_APP_SRC2: &str = "app_src2";

const SRC2_DIR: &str = "apps";

/// Mutable collection of aliases used while a task completes its paths.
#[derive(Debug, Clone, Default)]
pub struct AliasTableBuilder {
    entries: BTreeMap<String, PathBuf>,
}

impl AliasTableBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder with the well-known roots.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidInput`] when a root is not absolute.
    pub fn from_roots(
        res_root: impl Into<PathBuf>,
        src_root: impl Into<PathBuf>,
        user_root: Option<PathBuf>,
    ) -> FsOpsResult<Self> {
        let src_root = src_root.into();
        let mut builder = Self::new();
        builder.insert(ALIAS_RES, res_root)?;
        builder.insert(ALIAS_SRC2, src_root.join(SRC2_DIR))?;
        builder.insert(ALIAS_SRC, src_root)?;
        if let Some(user) = user_root {
            builder.insert(ALIAS_USER, user)?;
        }
        Ok(builder)
    }

    /// Derive the per-app aliases from `res` and `src`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::UnknownAlias`] when `res` or `src` is missing,
    /// [`FsOpsError::InvalidInput`] when the app name is not a plain name or a
    /// root has no parent, and [`FsOpsError::DuplicateAlias`] when the app
    /// aliases were already derived.
    pub fn with_app(mut self, app: &str) -> FsOpsResult<Self> {
        if app.is_empty() || app.contains(['/', '\\']) || app == "." || app == ".." {
            return Err(FsOpsError::InvalidInput {
                field: "app",
                reason: "must be a plain name",
                value: Some(app.to_string()),
            });
        }
        let app_res = sibling(self.require(ALIAS_RES)?, &format!("{app}-res"))?;
        let app_src = sibling(self.require(ALIAS_SRC)?, &format!("{app}-src"))?;
        let app_src2 = app_src.join(app);

        self.insert(ALIAS_APP_RES, app_res)?;
        self.insert(ALIAS_APP_SRC, app_src)?;
        self.insert(ALIAS_APP_SRC2, app_src2)?;
        Ok(self)
    }

    /// Insert a new alias. Existing aliases are never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::DuplicateAlias`] when `name` is already bound and
    /// [`FsOpsError::InvalidInput`] when the name is empty or the path relative.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> FsOpsResult<()> {
        let name = name.into();
        let path = path.into();
        if name.trim().is_empty() {
            return Err(FsOpsError::InvalidInput {
                field: "alias",
                reason: "empty",
                value: None,
            });
        }
        if !path.is_absolute() {
            return Err(FsOpsError::InvalidInput {
                field: "alias_path",
                reason: "must be absolute",
                value: Some(path.display().to_string()),
            });
        }
        if self.entries.contains_key(&name) {
            return Err(FsOpsError::DuplicateAlias { alias: name });
        }
        debug!(alias = %name, path = %path.display(), "bound path alias");
        self.entries.insert(name, path);
        Ok(())
    }

    /// Look up an alias bound so far.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Freeze the aliases into an immutable table.
    #[must_use]
    pub fn build(self) -> PathAliasTable {
        PathAliasTable {
            entries: Arc::new(self.entries),
        }
    }

    fn require(&self, name: &str) -> FsOpsResult<&Path> {
        self.get(name).ok_or_else(|| FsOpsError::UnknownAlias {
            alias: name.to_string(),
        })
    }
}

fn sibling(root: &Path, name: &str) -> FsOpsResult<PathBuf> {
    root.parent()
        .map(|parent| parent.join(name))
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "alias_path",
            reason: "root has no parent",
            value: Some(root.display().to_string()),
        })
}

/// Immutable alias table shared by every subtask of a task.
#[derive(Debug, Clone, Default)]
pub struct PathAliasTable {
    entries: Arc<BTreeMap<String, PathBuf>>,
}

impl PathAliasTable {
    /// Resolve an alias to its absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::UnknownAlias`] when the alias is not bound.
    pub fn resolve(&self, name: &str) -> FsOpsResult<&Path> {
        self.entries
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| FsOpsError::UnknownAlias {
                alias: name.to_string(),
            })
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate aliases in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Number of bound aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no aliases are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ensure the directory behind `alias` exists, optionally clearing it first.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::UnknownAlias`] for unbound aliases and
    /// [`FsOpsError::Io`] when the directory cannot be cleared or created.
    pub fn make_path(&self, alias: &str, delete_first: bool) -> FsOpsResult<PathBuf> {
        let path = self.resolve(alias)?.to_path_buf();
        if delete_first {
            match fs::remove_dir_all(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(FsOpsError::io("make_path.clear", &path, err)),
            }
        }
        fs::create_dir_all(&path).map_err(|err| FsOpsError::io("make_path.create", &path, err))?;
        Ok(path)
    }
}

/// Append-only list of search roots ordered by rank, then insertion order.
///
/// Lower ranks are searched first. Readers take a [`SearchSnapshot`], which
/// never observes later insertions.
#[derive(Debug, Default)]
pub struct SearchPaths {
    entries: Vec<(i32, u64, PathBuf)>,
    next_seq: u64,
    snapshot: Option<SearchSnapshot>,
}

impl SearchPaths {
    /// Start an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `path` at `rank`; equal ranks keep insertion order.
    pub fn insert(&mut self, rank: i32, path: impl Into<PathBuf>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let position = self
            .entries
            .partition_point(|(existing, _, _)| *existing <= rank);
        self.entries.insert(position, (rank, seq, path.into()));
        self.snapshot = None;
    }

    /// Immutable view of the current ordering.
    pub fn snapshot(&mut self) -> SearchSnapshot {
        if let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }
        let snapshot = SearchSnapshot {
            paths: self
                .entries
                .iter()
                .map(|(_, _, path)| path.clone())
                .collect(),
        };
        self.snapshot = Some(snapshot.clone());
        snapshot
    }
}

/// Frozen, shareable search order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSnapshot {
    paths: Arc<[PathBuf]>,
}

impl SearchSnapshot {
    /// Roots in search order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// First root under which `relative` exists, joined with `relative`.
    #[must_use]
    pub fn find(&self, relative: &Path) -> Option<PathBuf> {
        self.paths
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.exists())
    }
}
