//! Staleness decisions across refreshes and builds.

use std::fs;
use std::path::Path;

use kiln_build::{
    ArtifactSource, BatchSummary, BuildDescriptor, BuildDescriptorSet, BuildObserver, BuildWorker,
    ChecksumOptions, FileTreeChecksum, SkipFilter, TraversalOrder, ZipGenerator, compute,
    write_stamp,
};
use kiln_test_support::{set_mtime, temp_workspace, write_file};

type TestResult<T> = anyhow::Result<T>;

const T1: i64 = 1_700_000_000;
const T2: i64 = 1_700_000_600;

#[test]
fn mtime_bump_makes_a_fresh_artifact_stale() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    let mut files = Vec::new();
    for index in 0..120 {
        let path = write_file(
            root,
            &format!("data/core/unit-{index:03}.cfg"),
            vec![b'x'; 500_000 / 120 + usize::from(index < 500_000 % 120)],
        )?;
        set_mtime(&path, T1)?;
        files.push(path);
    }
    write_file(root, "xwml/data.bin", "archive")?;
    write_stamp(
        &root.join("xwml/data.bin"),
        &FileTreeChecksum::new(120, 500_000, T1.unsigned_abs()),
    )?;

    let mut set = BuildDescriptorSet::new(root);
    set.refresh_with(vec![ArtifactSource::system().remove(0)])?;
    let data = &set.descriptors()[0];
    assert_eq!(
        data.source_checksum,
        FileTreeChecksum::new(120, 500_000, T1.unsigned_abs())
    );
    assert!(!data.needs_build);

    set_mtime(&files[57], T2)?;
    set.refresh_with(vec![ArtifactSource::system().remove(0)])?;
    let data = &set.descriptors()[0];
    assert_eq!(
        data.source_checksum,
        FileTreeChecksum::new(120, 500_000, T2.unsigned_abs())
    );
    assert!(data.needs_build);
    Ok(())
}

#[test]
fn added_file_makes_an_artifact_stale() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "data/gui/window.cfg", "window")?;

    let mut set = BuildDescriptorSet::new(root);
    set.refresh()?;
    let handle = BuildWorker::new(&set).start(ZipGenerator)?;
    assert_eq!(handle.join()?.failed, 0);

    set.refresh()?;
    assert!(
        !gui(&set)?.needs_build,
        "freshly built artifact is up to date"
    );

    write_file(root, "data/gui/dialog.cfg", "dialog")?;
    set.refresh()?;
    assert!(gui(&set)?.needs_build);
    Ok(())
}

fn gui(set: &BuildDescriptorSet) -> TestResult<&BuildDescriptor> {
    set.descriptors()
        .iter()
        .find(|descriptor| descriptor.artifact_name == "gui.bin")
        .ok_or_else(|| anyhow::anyhow!("gui descriptor missing"))
}

#[test]
fn traversal_order_does_not_change_the_checksum() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    for (index, name) in ["b/z.cfg", "a/y.cfg", "a/deep/x.cfg", "c.cfg", "b/images/i.png"]
        .iter()
        .enumerate()
    {
        let path = write_file(root, name, "x".repeat(index + 1))?;
        set_mtime(&path, T1 + i64::try_from(index)?)?;
    }

    let checksums: Vec<FileTreeChecksum> = [
        TraversalOrder::NameAscending,
        TraversalOrder::NameDescending,
        TraversalOrder::Unsorted,
    ]
    .into_iter()
    .map(|order| {
        compute(
            root,
            &ChecksumOptions {
                skip: SkipFilter::MEDIA,
                order,
                ..ChecksumOptions::default()
            },
        )
    })
    .collect::<Result<_, _>>()?;

    assert_eq!(checksums[0], checksums[1]);
    assert_eq!(checksums[1], checksums[2]);
    assert_eq!(checksums[0].file_count, 4);
    assert_eq!(compute(root, &ChecksumOptions::skipping(SkipFilter::MEDIA))?, checksums[0]);
    Ok(())
}

#[derive(Default)]
struct Progress {
    started: Vec<String>,
    files: usize,
    finished: Vec<(String, bool)>,
    summary: Option<BatchSummary>,
}

impl BuildObserver for Progress {
    fn on_item_start(&mut self, _index: usize, descriptor: &BuildDescriptor) {
        self.started.push(descriptor.label());
    }

    fn on_progress(&mut self, _index: usize, _descriptor: &BuildDescriptor, _file: &Path) {
        self.files += 1;
    }

    fn on_item_finished(&mut self, _index: usize, descriptor: &BuildDescriptor, ok: bool) {
        self.finished.push((descriptor.label(), ok));
    }

    fn on_batch_finished(&mut self, summary: &BatchSummary) {
        self.summary = Some(*summary);
    }
}

#[test]
fn worker_builds_system_and_app_artifacts() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "data/core/units.cfg", "units")?;
    write_file(root, "data/languages/en.cfg", "en")?;
    write_file(
        root,
        "app-kingdom/bin.json",
        r#"{"path": "app-kingdom/campaigns", "scenarios": ["main"]}"#,
    )?;
    write_file(root, "app-kingdom/campaigns/main/01.cfg", "scenario")?;
    write_file(root, "app-kingdom/campaigns/main/book/page.cfg", "skipped")?;

    let mut set = BuildDescriptorSet::new(root);
    set.refresh()?;
    assert_eq!(set.pending_count(), 3);

    let mut progress = Progress::default();
    let summary = BuildWorker::new(&set)
        .start(ZipGenerator)?
        .dispatch(&mut progress)?;

    assert_eq!(summary.succeeded, 3);
    assert_eq!(progress.summary, Some(summary));
    assert_eq!(
        progress.started,
        vec!["data.bin", "language.bin", "app-kingdom/main.bin"]
    );
    assert_eq!(progress.files, 4);
    assert!(progress.finished.iter().all(|(_, ok)| *ok));
    assert!(root.join("xwml/app-kingdom/main.bin").is_file());

    for index in 0..set.descriptors().len() {
        set.refresh_artifact_checksum(index);
    }
    assert_eq!(set.pending_count(), 0);
    Ok(())
}

#[test]
fn ensure_system_artifacts_only_builds_missing_ones() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "data/gui/window.cfg", "window")?;
    write_file(root, "xwml/data.bin", "existing")?;

    let mut set = BuildDescriptorSet::new(root);
    set.refresh()?;
    let built = set.ensure_system_artifacts(&mut ZipGenerator)?;

    assert_eq!(built, 2);
    assert_eq!(fs::read_to_string(root.join("xwml/data.bin"))?, "existing");
    assert!(root.join("xwml/gui.bin").is_file());
    assert!(root.join("xwml/language.bin").is_file());
    assert!(!gui(&set)?.needs_build);
    Ok(())
}
