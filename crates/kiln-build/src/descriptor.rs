//! Build descriptor set: which artifacts exist, where they come from, and
//! whether they are stale.
//!
//! # Design
//! - Every artifact pairs the checksum of its sources with the checksum stamped
//!   when it was last written; `needs_build` is their inequality.
//! - Sources are short paths resolved against ranked search paths (the working
//!   tree first); every existing candidate contributes to the checksum.
//! - Per-app artifacts are discovered from `app-<name>/bin.json` manifests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_config::{AppBinManifest, load_app_manifest};
use kiln_fsops::SearchPaths;
use serde::Serialize;
use tracing::{debug, info};

use crate::checksum::{ChecksumOptions, FileTreeChecksum, SkipFilter, compute_all};
use crate::error::{BuildError, BuildResult};
use crate::generate::ArtifactGenerator;
use crate::stamp::{read_stamp, write_stamp};

/// Directory under the working tree that receives generated artifacts.
pub const ARTIFACT_DIR: &str = "xwml";
/// Per-app manifest file name.
pub const APP_MANIFEST: &str = "bin.json";
/// Prefix of per-app directories in the working tree and in [`ARTIFACT_DIR`].
pub const APP_DIR_PREFIX: &str = "app-";
/// Main data artifact.
pub const DATA_BIN: &str = "data.bin";
/// GUI artifact.
pub const GUI_BIN: &str = "gui.bin";
/// Language artifact.
pub const LANGUAGE_BIN: &str = "language.bin";

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `data.bin`.
    MainData,
    /// `gui.bin`.
    Gui,
    /// `language.bin`.
    Language,
    /// Per-app `<id>.bin`.
    AppData,
}

impl ArtifactKind {
    /// Label used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainData => "main_data",
            Self::Gui => "gui",
            Self::Language => "language",
            Self::AppData => "app_data",
        }
    }

    /// Whether this is one of the fixed system artifacts.
    #[must_use]
    pub const fn is_system(self) -> bool {
        !matches!(self, Self::AppData)
    }
}

/// Declared origin of one artifact, before any checksum is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Artifact file name.
    pub name: String,
    /// Owning app for per-app artifacts.
    pub app: Option<String>,
    /// Source directories relative to each search path.
    pub short_paths: Vec<String>,
    /// Directory categories excluded from the sources.
    pub skip: SkipFilter,
}

impl ArtifactSource {
    /// The fixed system artifacts.
    #[must_use]
    pub fn system() -> Vec<Self> {
        vec![
            Self {
                kind: ArtifactKind::MainData,
                name: DATA_BIN.to_string(),
                app: None,
                short_paths: vec!["data".to_string()],
                skip: SkipFilter::MEDIA | SkipFilter::SCENARIO | SkipFilter::GUI,
            },
            Self {
                kind: ArtifactKind::Gui,
                name: GUI_BIN.to_string(),
                app: None,
                short_paths: vec!["data/gui".to_string()],
                skip: SkipFilter::MEDIA,
            },
            Self {
                kind: ArtifactKind::Language,
                name: LANGUAGE_BIN.to_string(),
                app: None,
                short_paths: vec!["data/languages".to_string()],
                skip: SkipFilter::MEDIA,
            },
        ]
    }

    /// One artifact per scenario id declared in `manifest`.
    #[must_use]
    pub fn app_data(app: &str, manifest: &AppBinManifest) -> Vec<Self> {
        manifest
            .scenarios
            .iter()
            .map(|id| {
                let mut short_paths = Vec::new();
                if let Some(macros) = &manifest.macros {
                    short_paths.push(macros.clone());
                }
                short_paths.push(format!("{}/{id}", manifest.path.trim_end_matches('/')));
                Self {
                    kind: ArtifactKind::AppData,
                    name: format!("{id}.bin"),
                    app: Some(app.to_string()),
                    short_paths,
                    skip: SkipFilter::MEDIA
                        | SkipFilter::GUI
                        | SkipFilter::INTERNAL
                        | SkipFilter::BOOK,
                }
            })
            .collect()
    }
}

/// A source directory that exists under one search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDir {
    /// Short path as declared; used as the prefix of archive entries.
    pub short_path: String,
    /// Absolute directory.
    pub root: PathBuf,
}

/// One generatable artifact and its staleness.
#[derive(Debug, Clone)]
pub struct BuildDescriptor {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Artifact file name.
    pub artifact_name: String,
    /// Owning app for per-app artifacts.
    pub app: Option<String>,
    /// Where the artifact is written.
    pub output: PathBuf,
    /// Existing source directories, in search-path order.
    pub sources: Vec<SourceDir>,
    /// Walk options used for the source checksum and for generation.
    pub options: ChecksumOptions,
    /// Current fingerprint of the sources.
    pub source_checksum: FileTreeChecksum,
    /// Fingerprint stamped when the artifact was last written.
    pub artifact_checksum: FileTreeChecksum,
    /// Whether the artifact must be regenerated.
    pub needs_build: bool,
}

impl BuildDescriptor {
    /// `app-<app>/<name>` for per-app artifacts, the bare name otherwise.
    #[must_use]
    pub fn label(&self) -> String {
        self.app.as_ref().map_or_else(
            || self.artifact_name.clone(),
            |app| format!("{APP_DIR_PREFIX}{app}/{}", self.artifact_name),
        )
    }
}

/// Descriptors for every artifact of one working tree.
#[derive(Debug)]
pub struct BuildDescriptorSet {
    working_dir: PathBuf,
    search: SearchPaths,
    manifest_leaf: bool,
    descriptors: Vec<BuildDescriptor>,
}

impl BuildDescriptorSet {
    /// Descriptor set rooted at `working_dir`, which is also the first search path.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let mut search = SearchPaths::new();
        search.insert(0, working_dir.clone());
        Self {
            working_dir,
            search,
            manifest_leaf: false,
            descriptors: Vec::new(),
        }
    }

    /// Add another tree (such as per-user data) whose sources also count.
    /// Lower ranks are searched first.
    #[must_use]
    pub fn with_search_path(mut self, rank: i32, path: impl Into<PathBuf>) -> Self {
        self.search.insert(rank, path);
        self
    }

    /// Treat directories holding a manifest file as single checksum leaves.
    #[must_use]
    pub const fn with_manifest_leaf(mut self, enabled: bool) -> Self {
        self.manifest_leaf = enabled;
        self
    }

    /// Root of the working tree.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Directory receiving artifacts of `app`, or system artifacts when `None`.
    #[must_use]
    pub fn artifact_dir(&self, app: Option<&str>) -> PathBuf {
        let base = self.working_dir.join(ARTIFACT_DIR);
        match app {
            Some(app) => base.join(format!("{APP_DIR_PREFIX}{app}")),
            None => base,
        }
    }

    /// Scan the working tree for `app-<name>/bin.json` manifests.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] when the working tree cannot be listed and
    /// [`BuildError::Manifest`] when a manifest is invalid.
    pub fn discover_apps(&self) -> BuildResult<Vec<ArtifactSource>> {
        let listing = match fs::read_dir(&self.working_dir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(BuildError::io("descriptor.discover", &self.working_dir, err)),
        };

        let mut apps = Vec::new();
        for entry in listing {
            let entry =
                entry.map_err(|err| BuildError::io("descriptor.discover", &self.working_dir, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(app) = name.strip_prefix(APP_DIR_PREFIX) else {
                continue;
            };
            let manifest = entry.path().join(APP_MANIFEST);
            if app.is_empty() || !manifest.is_file() {
                continue;
            }
            apps.push((app.to_string(), manifest));
        }
        apps.sort();

        let mut sources = Vec::new();
        for (app, path) in apps {
            let manifest = load_app_manifest(&path)
                .map_err(|source| BuildError::Manifest { path: path.clone(), source })?;
            debug!(app = %app, scenarios = manifest.scenarios.len(), "discovered app manifest");
            sources.extend(ArtifactSource::app_data(&app, &manifest));
        }
        Ok(sources)
    }

    /// Recompute descriptors for the system artifacts and every discovered app artifact.
    ///
    /// # Errors
    ///
    /// Returns discovery and checksum errors.
    pub fn refresh(&mut self) -> BuildResult<&[BuildDescriptor]> {
        let mut sources = ArtifactSource::system();
        sources.extend(self.discover_apps()?);
        self.refresh_with(sources)
    }

    /// Recompute descriptors for an explicit list of artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Walkdir`] or [`BuildError::Io`] when a source tree
    /// cannot be inspected.
    pub fn refresh_with(&mut self, sources: Vec<ArtifactSource>) -> BuildResult<&[BuildDescriptor]> {
        let roots = self.search.snapshot();
        let mut descriptors = Vec::with_capacity(sources.len());
        for source in sources {
            let sources: Vec<SourceDir> = source
                .short_paths
                .iter()
                .flat_map(|short| {
                    roots.paths().iter().map(move |root| SourceDir {
                        short_path: short.clone(),
                        root: root.join(short),
                    })
                })
                .filter(|dir| dir.root.is_dir())
                .collect();
            let options = ChecksumOptions {
                skip: source.skip,
                manifest_leaf: self.manifest_leaf,
                ..ChecksumOptions::default()
            };
            let source_checksum =
                compute_all(sources.iter().map(|dir| dir.root.as_path()), &options)?;
            let output = self
                .artifact_dir(source.app.as_deref())
                .join(&source.name);
            let artifact_checksum = read_stamp(&output);
            let descriptor = BuildDescriptor {
                kind: source.kind,
                artifact_name: source.name,
                app: source.app,
                output,
                sources,
                options,
                source_checksum,
                artifact_checksum,
                needs_build: source_checksum != artifact_checksum,
            };
            debug!(
                artifact = %descriptor.label(),
                needs_build = descriptor.needs_build,
                "refreshed build descriptor"
            );
            descriptors.push(descriptor);
        }
        self.descriptors = descriptors;
        info!(
            artifacts = self.descriptors.len(),
            pending = self.pending_count(),
            "build descriptors refreshed"
        );
        Ok(&self.descriptors)
    }

    /// Descriptors from the last refresh.
    #[must_use]
    pub fn descriptors(&self) -> &[BuildDescriptor] {
        &self.descriptors
    }

    /// Stale descriptors with their positions.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &BuildDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| descriptor.needs_build)
    }

    /// Number of stale descriptors.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Re-read the stamp of descriptor `index` after it was regenerated.
    pub fn refresh_artifact_checksum(&mut self, index: usize) -> Option<&BuildDescriptor> {
        let descriptor = self.descriptors.get_mut(index)?;
        descriptor.artifact_checksum = read_stamp(&descriptor.output);
        descriptor.needs_build = descriptor.source_checksum != descriptor.artifact_checksum;
        Some(descriptor)
    }

    /// Synchronously generate every system artifact missing on disk.
    ///
    /// Returns how many were generated.
    ///
    /// # Errors
    ///
    /// Returns the first generator or stamp error.
    pub fn ensure_system_artifacts(
        &mut self,
        generator: &mut dyn ArtifactGenerator,
    ) -> BuildResult<usize> {
        let missing: Vec<usize> = self
            .descriptors
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| descriptor.kind.is_system() && !descriptor.output.is_file())
            .map(|(index, _)| index)
            .collect();

        for &index in &missing {
            let descriptor = &self.descriptors[index];
            info!(artifact = %descriptor.label(), "generating missing system artifact");
            generator.generate(descriptor, &mut |_| {})?;
            write_stamp(&descriptor.output, &descriptor.source_checksum)?;
            self.refresh_artifact_checksum(index);
        }
        Ok(missing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_test_support::{set_mtime, temp_workspace, write_file};

    type TestResult<T> = anyhow::Result<T>;

    #[test]
    fn system_sources_follow_the_fixed_layout() {
        let sources = ArtifactSource::system();
        let names: Vec<&str> = sources.iter().map(|source| source.name.as_str()).collect();
        assert_eq!(names, vec![DATA_BIN, GUI_BIN, LANGUAGE_BIN]);
        assert!(sources[0].skip.skips("gui"));
        assert!(sources[0].skip.skips("scenarios"));
        assert!(!sources[1].skip.skips("scenarios"));
    }

    #[test]
    fn discovers_app_manifests() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(
            root,
            "app-kingdom/bin.json",
            r#"{"path": "app-kingdom/campaigns", "macros": "data/core/macros", "scenarios": ["main", "tutorial"]}"#,
        )?;
        write_file(root, "app-empty/readme.txt", "no manifest")?;
        write_file(root, "data/_main.cfg", "")?;

        let set = BuildDescriptorSet::new(root);
        let sources = set.discover_apps()?;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "main.bin");
        assert_eq!(sources[0].app.as_deref(), Some("kingdom"));
        assert_eq!(
            sources[0].short_paths,
            vec!["data/core/macros", "app-kingdom/campaigns/main"]
        );
        Ok(())
    }

    #[test]
    fn invalid_manifest_is_reported_with_its_path() -> TestResult<()> {
        let dir = temp_workspace()?;
        write_file(dir.path(), "app-bad/bin.json", r#"{"path": "/abs", "scenarios": []}"#)?;
        let err = BuildDescriptorSet::new(dir.path())
            .discover_apps()
            .expect_err("absolute path rejected");
        assert!(matches!(err, BuildError::Manifest { path, .. } if path.ends_with("bin.json")));
        Ok(())
    }

    #[test]
    fn refresh_marks_missing_artifacts_stale() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        let file = write_file(root, "data/core/units.cfg", "units")?;
        write_file(root, "data/gui/window.cfg", "window")?;
        write_file(root, "data/core/images/a.png", "png")?;
        set_mtime(&file, 1_000)?;

        let mut set = BuildDescriptorSet::new(root);
        let descriptors = set.refresh()?;
        assert_eq!(descriptors.len(), 3);
        let data = &descriptors[0];
        assert_eq!(data.source_checksum.file_count, 1);
        assert_eq!(data.output, root.join("xwml/data.bin"));
        assert!(data.needs_build);
        assert!(descriptors[2].source_checksum.is_zero());
        assert!(!descriptors[2].needs_build, "no sources and no artifact");
        assert_eq!(set.pending_count(), 2);
        Ok(())
    }

    #[test]
    fn user_tree_contributes_to_the_checksum() -> TestResult<()> {
        let work = temp_workspace()?;
        let user = temp_workspace()?;
        write_file(work.path(), "data/gui/a.cfg", "a")?;
        write_file(user.path(), "data/gui/b.cfg", "bb")?;

        let mut set = BuildDescriptorSet::new(work.path()).with_search_path(10, user.path());
        set.refresh_with(vec![ArtifactSource::system().remove(1)])?;
        let gui = &set.descriptors()[0];
        assert_eq!(gui.sources.len(), 2);
        assert_eq!(gui.sources[0].root, work.path().join("data/gui"));
        assert_eq!(gui.source_checksum.total_size, 3);
        Ok(())
    }
}
