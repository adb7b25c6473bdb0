//! End-to-end task runs against a temporary tree.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use kiln_config::parse_task;
use kiln_events::{Event, EventBus};
use kiln_fsops::{
    ALIAS_APP_RES, ALIAS_RES, AliasTableBuilder, FsOpsError, FsOpsResult, PathAliasTable,
    Replacement, RollbackOutcome, RollbackStatus, Subtask, SubtaskState, Task, TaskHooks,
    TaskOutcome,
};
use kiln_telemetry::Metrics;
use kiln_test_support::{temp_workspace, tree_snapshot, write_file};

type TestResult<T> = anyhow::Result<T>;

fn roots(root: &Path) -> TestResult<AliasTableBuilder> {
    let mut builder = AliasTableBuilder::new();
    builder.insert("src", root.join("src"))?;
    builder.insert("dst", root.join("dst"))?;
    Ok(builder)
}

#[test]
fn failed_copy_removes_files_created_by_earlier_subtasks() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "src/readme.txt", "hello")?;
    let spec = parse_task(
        r#"{
            "name": "export",
            "subtasks": [
                {"type": "copy", "id": "A", "src_alias": "src", "dst_alias": "dst",
                 "resources": [{"type": "file", "name": "readme.txt"}]},
                {"type": "copy", "id": "B", "src_alias": "src", "dst_alias": "dst",
                 "resources": [{"type": "file", "name": "missing.bin"}]}
            ]
        }"#,
    )?;
    let before = tree_snapshot(root)?;

    let metrics = Metrics::new()?;
    let mut task = Task::builder(spec, roots(root)?)
        .metrics(metrics.clone())
        .build()?;
    let report = task.handle();

    assert!(!report.succeeded());
    assert_eq!(report.executed, vec!["A"]);
    let TaskOutcome::Failed {
        subtask,
        error,
        rollback,
    } = &report.outcome
    else {
        anyhow::bail!("task should fail");
    };
    assert_eq!(subtask, "B");
    assert!(matches!(error, FsOpsError::ResourceNotFound { .. }));
    assert_eq!(*rollback, RollbackStatus::Clean);

    assert!(!root.join("dst/readme.txt").exists());
    assert!(!root.join("dst").exists());
    assert_eq!(tree_snapshot(root)?, before);
    assert_eq!(task.subtasks()[0].state(), SubtaskState::RolledBack);
    assert_eq!(task.subtasks()[1].state(), SubtaskState::RolledBack);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.tasks_failed, 1);
    assert_eq!(snapshot.rollbacks_failed, 0);
    Ok(())
}

#[test]
fn overwritten_files_are_restored_from_backups() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "src/app.cfg", "new")?;
    write_file(root, "dst/app.cfg", "old")?;
    let spec = parse_task(
        r#"{
            "name": "refresh",
            "subtasks": [
                {"type": "copy", "id": "cfg", "src_alias": "src", "dst_alias": "dst",
                 "backup_overwritten": true,
                 "resources": [{"type": "file", "name": "app.cfg", "overwrite": true}]},
                {"type": "copy", "id": "boom", "src_alias": "src", "dst_alias": "dst",
                 "resources": [{"type": "dir", "name": "missing"}]}
            ]
        }"#,
    )?;

    let mut task = Task::builder(spec, roots(root)?).build()?;
    let report = task.handle();

    assert_eq!(report.rollback_status(), Some(RollbackStatus::Clean));
    assert_eq!(fs::read_to_string(root.join("dst/app.cfg"))?, "old");
    let restored = report
        .rollbacks
        .iter()
        .find(|entry| entry.subtask == "cfg")
        .map(|entry| &entry.result);
    assert!(matches!(
        restored,
        Some(Ok(RollbackOutcome::RolledBack { restored, .. })) if restored.len() == 1
    ));
    Ok(())
}

struct AppHooks {
    app: String,
    post_runs: Mutex<usize>,
}

impl TaskHooks for AppHooks {
    fn complete_paths(&self, aliases: &mut AliasTableBuilder) -> FsOpsResult<()> {
        let derived = std::mem::take(aliases).with_app(&self.app)?;
        *aliases = derived;
        Ok(())
    }

    fn post_handle(
        &self,
        _subtask: &Subtask,
        last: bool,
        aliases: &PathAliasTable,
    ) -> FsOpsResult<()> {
        assert!(last);
        let app_res = aliases.resolve(ALIAS_APP_RES)?;
        fs::write(app_res.join("marker"), b"done").map_err(|source| FsOpsError::Io {
            operation: "test.marker",
            path: app_res.join("marker"),
            source,
        })?;
        if let Ok(mut runs) = self.post_runs.lock() {
            *runs += 1;
        }
        Ok(())
    }

    fn replacement(&self) -> Option<Replacement> {
        Some(Replacement::new("<new_>", self.app.clone()))
    }
}

#[test]
fn hooks_complete_aliases_and_rename_with_replacement() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "res/data/core/units.cfg", "units")?;
    write_file(root, "res/data/core/images/a.png", "png")?;
    fs::create_dir_all(root.join("src/apps"))?;
    let spec = parse_task(
        r#"{
            "name": "new-app",
            "subtasks": [
                {"type": "copy", "id": "core", "src_alias": "res", "dst_alias": "app_res",
                 "resources": [{"type": "dir", "name": "data/core"}]},
                {"type": "rename", "id": "cfg", "base_path_alias": "app_res",
                 "resources": [{"type": "file", "name": "data/core/units.cfg",
                                "custom": "data/core/<new_>.cfg"}]}
            ]
        }"#,
    )?;
    let hooks = Arc::new(AppHooks {
        app: "kingdom".into(),
        post_runs: Mutex::new(0),
    });
    let builder = AliasTableBuilder::from_roots(root.join("res"), root.join("src"), None)?;
    let events = EventBus::new();

    let mut task = Task::builder(spec, builder)
        .hooks(hooks.clone())
        .events(events.clone())
        .build()?;
    assert!(task.aliases().contains(ALIAS_RES));
    let report = task.handle();

    assert!(report.succeeded(), "{:?}", report.outcome);
    let app_res = root.join("kingdom-res");
    assert!(app_res.join("data/core/kingdom.cfg").is_file());
    assert!(app_res.join("data/core/images/a.png").is_file());
    assert!(app_res.join("marker").is_file());
    assert_eq!(*hooks.post_runs.lock().map_err(|_| anyhow::anyhow!("poisoned"))?, 1);

    let backlog = events.backlog_since(0);
    assert!(matches!(
        backlog.last().map(|env| &env.event),
        Some(Event::TaskCompleted { task, .. }) if task == "new-app"
    ));
    Ok(())
}

#[test]
fn unknown_alias_fails_before_anything_runs() -> TestResult<()> {
    let dir = temp_workspace()?;
    let root = dir.path();
    write_file(root, "src/a.txt", "a")?;
    let spec = parse_task(
        r#"{
            "name": "typo",
            "subtasks": [
                {"type": "copy", "id": "a", "src_alias": "src", "dst_alias": "dts",
                 "resources": [{"type": "file", "name": "a.txt"}]}
            ]
        }"#,
    )?;

    let err = Task::builder(spec, roots(root)?)
        .build()
        .expect_err("alias is not bound");
    assert!(matches!(err, FsOpsError::UnknownAlias { ref alias } if alias == "dts"));
    assert!(!root.join("dst").exists());
    Ok(())
}
