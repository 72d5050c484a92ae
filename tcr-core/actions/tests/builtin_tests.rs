//! 内置动作集成测试: 通过用例执行器运行真实文件操作

use tcr_actions::builtin_registry;
use tcr_executor::*;

#[tokio::test]
async fn test_builtin_types_registered() {
    let registry = builtin_registry().await.unwrap();
    let types = registry.list().await;

    for step_type in [
        "Copy File",
        "Move File",
        "Delete File/Folder",
        "Rename File",
        "Create Directory",
        "Check File Exists",
        "Compare Files",
        "Wait for File",
        "Extract Archive",
        "Run Command",
        "Start Process",
        "Stop Process",
        "Check Process Running",
        "Check Disk Space",
        "Check Memory",
        "Check Log File",
    ] {
        assert!(types.contains(&step_type.to_string()), "{}", step_type);
    }
    assert_eq!(types.len(), 16);
}

#[tokio::test]
async fn test_file_workflow_with_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().into_owned();
    let work = format!("{}/work", root);
    let source = format!("{}/input.txt", root);
    std::fs::write(&source, "payload").unwrap();

    let case = Case::with_steps(
        "file workflow",
        vec![
            StepDefinition::new("make dir", "Create Directory")
                .with_category("Setup")
                .with_detail("path", work.as_str()),
            StepDefinition::new("copy", "Copy File")
                .with_detail("from", source.as_str())
                .with_detail("to", work.as_str()),
            StepDefinition::new("compare", "Compare Files")
                .with_category("Validation")
                .with_detail("file1", source.as_str())
                .with_detail("file2", format!("{}/input.txt", work))
                .with_condition(RunCondition::IfPreviousPassed),
            StepDefinition::new("missing", "Check File Exists")
                .with_detail("path", format!("{}/nope.txt", work)),
            StepDefinition::new("cleanup", "Delete File/Folder")
                .with_category("Cleanup")
                .with_detail("path", work.as_str())
                .with_detail("recursive_var", true)
                .with_condition(RunCondition::IfAnyPreviousFailed),
        ],
    );

    let report = CaseRunner::new(builtin_registry().await.unwrap())
        .run(&case)
        .await;

    let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Passed,
            StepStatus::Passed,
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Passed,
        ]
    );
    assert_eq!(report.verdict, CaseVerdict::Fail);
    assert!(!std::path::Path::new(&work).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_failure_triggers_recovery() {
    let case = Case::with_steps(
        "command",
        vec![
            StepDefinition::new("fails", "Run Command").with_detail("command", "exit 1"),
            StepDefinition::new("recover", "Run Command")
                .with_detail("command", "true")
                .with_condition(RunCondition::IfSpecificStepFailed)
                .with_target(1),
            StepDefinition::new("only on error", "Run Command")
                .with_detail("command", "true")
                .with_condition(RunCondition::OnErrorOnly),
        ],
    );

    let report = CaseRunner::new(builtin_registry().await.unwrap())
        .run(&case)
        .await;

    assert_eq!(report.steps[0].status, StepStatus::Failed);
    assert_eq!(report.steps[1].status, StepStatus::Passed);
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
}
