use kiln_config::{
    ConfigError, ResourceKind, SubtaskSpec, load_app_manifest, load_project, load_task,
};
use kiln_test_support::{temp_workspace, write_file};

#[test]
fn project_file_round_trips_through_loader() -> anyhow::Result<()> {
    let dir = temp_workspace()?;
    let path = write_file(
        dir.path(),
        "project.json",
        r#"{
            "roots": {"res_root": "/work/apps-res", "src_root": "/work/apps-src"},
            "telemetry": {"log_level": "debug", "log_format": "json"},
            "tasks": [
                {
                    "name": "new_app",
                    "subtasks": [
                        {
                            "type": "copy",
                            "id": "res",
                            "src_alias": "res",
                            "dst_alias": "app_res",
                            "resources": [
                                {"type": "dir", "name": "data/core"},
                                {"type": "files", "name": "app-<new_>"}
                            ]
                        },
                        {
                            "type": "rename",
                            "id": "sln",
                            "base_path_alias": "app_src2",
                            "resources": [
                                {"type": "file", "name": "projectfiles/vc/studio.sln", "custom": "projectfiles/vc/<new_>.sln"}
                            ]
                        }
                    ]
                }
            ]
        }"#,
    )?;

    let project = load_project(&path)?;
    assert_eq!(project.telemetry.log_level, "debug");
    let task = project.task("new_app").expect("task declared");
    assert_eq!(task.subtasks.len(), 2);
    assert!(matches!(task.subtasks[1], SubtaskSpec::Rename { .. }));
    assert_eq!(task.subtasks[0].resources()[1].kind, ResourceKind::Files);
    assert!(project.task("missing").is_none());
    Ok(())
}

#[test]
fn invalid_task_file_is_rejected_with_field_context() -> anyhow::Result<()> {
    let dir = temp_workspace()?;
    let path = write_file(
        dir.path(),
        "task.json",
        r#"{
            "name": "cleanup",
            "subtasks": [
                {"type": "remove", "id": "rm", "obj_alias": "app_res", "resources": [
                    {"type": "dir", "name": "../outside"}
                ]}
            ]
        }"#,
    )?;

    let err = load_task(&path).expect_err("escaping path must be rejected");
    match err {
        ConfigError::InvalidField {
            section,
            field,
            value,
            ..
        } => {
            assert_eq!(section, "task.cleanup.rm");
            assert_eq!(field, "name");
            assert_eq!(value.as_deref(), Some("../outside"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn app_manifest_loads_optional_macros() -> anyhow::Result<()> {
    let dir = temp_workspace()?;
    let path = write_file(
        dir.path(),
        "app-kingdom/bin.json",
        r#"{"path": "data/app-kingdom", "scenarios": ["campaign", "tutorial"]}"#,
    )?;

    let manifest = load_app_manifest(&path)?;
    assert!(manifest.macros.is_none());
    assert_eq!(manifest.scenarios, vec!["campaign", "tutorial"]);
    Ok(())
}
