//! Task hooks assembled from `provision` flags.

use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use kiln_fsops::{
    AliasTableBuilder, FsOpsError, FsOpsResult, PathAliasTable, Replacement, Subtask, TaskHooks,
    walk_dir,
};
use tracing::{debug, info, warn};

/// Token in resource names replaced by the app name.
pub(crate) const APP_TOKEN: &str = "<new_>";
/// Marker dropped into every directory of a provisioned tree.
pub(crate) const COOKIE_FILE: &str = "__cookie.cki";

/// Hooks for one `provision` run.
#[derive(Debug, Default)]
pub(crate) struct ProvisionHooks {
    pub(crate) app: Option<String>,
    pub(crate) skip: Vec<String>,
    pub(crate) cookies: Option<String>,
}

impl TaskHooks for ProvisionHooks {
    fn complete_paths(&self, aliases: &mut AliasTableBuilder) -> FsOpsResult<()> {
        if let Some(app) = &self.app {
            *aliases = std::mem::take(aliases).with_app(app)?;
        }
        Ok(())
    }

    fn can_execute(&self, subtask: &Subtask, _last: bool) -> bool {
        !self.skip.iter().any(|id| id == subtask.id())
    }

    fn post_handle(
        &self,
        subtask: &Subtask,
        _last: bool,
        aliases: &PathAliasTable,
    ) -> FsOpsResult<()> {
        let Some(alias) = &self.cookies else {
            return Ok(());
        };
        let root = aliases.resolve(alias)?;
        let written = drop_cookies(subtask.id(), root)?;
        info!(alias = %alias, directories = written, "dropped cookie files");
        Ok(())
    }

    fn replacement(&self) -> Option<Replacement> {
        self.app
            .as_ref()
            .map(|app| Replacement::new(APP_TOKEN, app.clone()))
    }
}

/// Write [`COOKIE_FILE`] into `root` and every directory below it.
///
/// Existing cookies are left untouched. On failure every cookie created by
/// this call is removed again before the error is returned.
///
/// # Errors
///
/// Returns the write or walk error, or [`FsOpsError::RollbackFailed`] listing
/// the cookies that could not be removed afterwards.
pub(crate) fn drop_cookies(subtask: &str, root: &Path) -> FsOpsResult<usize> {
    let mut created = Vec::new();
    match write_cookies(root, &mut created) {
        Ok(written) => Ok(written),
        Err(err) => {
            warn!(
                root = %root.display(),
                error = %err,
                created = created.len(),
                "removing partial cookies"
            );
            let leftovers: Vec<PathBuf> = created
                .into_iter()
                .filter(|path| match fs::remove_file(path) {
                    Ok(()) => false,
                    Err(source) if source.kind() == io::ErrorKind::NotFound => false,
                    Err(source) => {
                        warn!(path = %path.display(), error = %source, "failed to remove cookie");
                        true
                    }
                })
                .collect();
            if leftovers.is_empty() {
                Err(err)
            } else {
                Err(FsOpsError::RollbackFailed {
                    subtask: subtask.to_string(),
                    paths: leftovers,
                })
            }
        }
    }
}

fn write_cookies(root: &Path, created: &mut Vec<PathBuf>) -> FsOpsResult<usize> {
    write_cookie(root, created)?;
    let mut written = 1;
    let mut failure = None;
    walk_dir(root, true, |entry| {
        if !entry.is_dir() {
            return ControlFlow::Continue(());
        }
        match write_cookie(entry.path, created) {
            Ok(()) => {
                written += 1;
                ControlFlow::Continue(())
            }
            Err(err) => {
                failure = Some(err);
                ControlFlow::Break(())
            }
        }
    })?;
    failure.map_or(Ok(written), Err)
}

fn write_cookie(dir: &Path, created: &mut Vec<PathBuf>) -> FsOpsResult<()> {
    let path = dir.join(COOKIE_FILE);
    if path.is_file() {
        return Ok(());
    }
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| FsOpsError::Io {
            operation: "cookie.write",
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), "wrote cookie");
    created.push(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_fsops::{ALIAS_APP_RES, RemoveSubtask};
    use kiln_test_support::{temp_workspace, write_file};

    #[test]
    fn cookies_land_in_every_directory() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "a/b/c.txt", "c")?;
        write_file(root, "d/e.txt", "e")?;

        assert_eq!(drop_cookies("cookies", root)?, 4);
        for sub in ["", "a", "a/b", "d"] {
            assert!(root.join(sub).join(COOKIE_FILE).is_file(), "{sub}");
        }
        assert_eq!(drop_cookies("cookies", root)?, 4);
        Ok(())
    }

    #[test]
    fn failed_cookie_walk_removes_written_cookies() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "a/x.txt", "x")?;
        write_file(root, "b/y.txt", "y")?;
        write_file(root, "c/z.txt", "z")?;
        write_file(root, "c/__cookie.cki", "kept")?;
        fs::create_dir(root.join("b").join(COOKIE_FILE))?;

        let err = drop_cookies("cookies", root).expect_err("directory blocks the cookie");
        assert!(matches!(err, FsOpsError::Io { .. }), "{err:?}");
        assert!(!root.join(COOKIE_FILE).exists());
        assert!(!root.join("a").join(COOKIE_FILE).exists());
        assert!(root.join("b").join(COOKIE_FILE).is_dir());
        assert_eq!(fs::read_to_string(root.join("c").join(COOKIE_FILE))?, "kept");
        Ok(())
    }

    #[test]
    fn app_hooks_derive_aliases_and_replacement() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let hooks = ProvisionHooks {
            app: Some("kingdom".into()),
            skip: vec!["android".into()],
            cookies: None,
        };
        let mut builder =
            AliasTableBuilder::from_roots(dir.path().join("res"), dir.path().join("src"), None)?;
        hooks.complete_paths(&mut builder)?;
        assert_eq!(
            builder.get(ALIAS_APP_RES),
            Some(dir.path().join("kingdom-res").as_path())
        );
        assert_eq!(
            hooks.replacement(),
            Some(Replacement::new(APP_TOKEN, "kingdom"))
        );

        let skipped: Subtask = RemoveSubtask::new("android", "res", Vec::new()).into();
        let kept: Subtask = RemoveSubtask::new("ios", "res", Vec::new()).into();
        assert!(!hooks.can_execute(&skipped, false));
        assert!(hooks.can_execute(&kept, true));
        Ok(())
    }
}
