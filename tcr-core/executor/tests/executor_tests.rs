//! 执行器集成测试

use async_trait::async_trait;
use std::sync::Arc;
use tcr_executor::*;

/// details["ok"] 为 false 时失败
struct Check;

#[async_trait]
impl StepAction for Check {
    async fn execute(&self, details: &StepDetails) -> Result<ActionOutcome> {
        match details.get("ok").and_then(|v| v.as_bool()) {
            Some(false) => Ok(ActionOutcome::fail("check failed")),
            _ => Ok(ActionOutcome::pass("check passed")),
        }
    }
}

const SUITE_JSON: &str = r#"{
    "Login": [
        {"name": "prepare", "type": "Check", "details": {}, "run_condition": "Always", "category": "Setup", "target_step": ""},
        {"name": "verify", "type": "Check", "details": {"ok": false}, "run_condition": "If Previous Passed", "category": "Validation", "target_step": ""},
        {"name": "recover", "type": "Check", "details": {}, "run_condition": "If Specific Step Failed", "category": "Cleanup", "target_step": 2}
    ],
    "Smoke / Basic": [
        {"name": "ping", "type": "Check", "details": {"step_delay": "0"}}
    ]
}"#;

async fn registry() -> Arc<ActionRegistry> {
    let registry = Arc::new(ActionRegistry::new());
    registry.register("Check", Arc::new(Check)).await.unwrap();
    registry
}

#[test]
fn test_load_exported_suite() {
    let suite = Suite::from_json_str(SUITE_JSON).unwrap();

    assert_eq!(suite.names(), vec!["Login", "Smoke / Basic"]);
    let login = suite.get("Login").unwrap();
    assert_eq!(login.steps[2].run_condition, RunCondition::IfSpecificStepFailed);
    assert_eq!(login.steps[2].target_index(), Some(2));

    let smoke = suite.get("Smoke / Basic").unwrap();
    assert_eq!(smoke.steps[0].category, DEFAULT_CATEGORY);
    assert_eq!(smoke.steps[0].run_condition, RunCondition::Always);
}

#[tokio::test]
async fn test_suite_run_writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let suite = Suite::from_json_str(SUITE_JSON).unwrap();

    let report = SuiteRunner::new(registry().await)
        .with_sink(Arc::new(FileSink::new(dir.path())))
        .run(&suite)
        .await;

    assert_eq!(report.results["Login"].verdict, CaseVerdict::Fail);
    assert_eq!(report.results["Smoke / Basic"].verdict, CaseVerdict::Pass);

    let login = report.results["Login"].report.as_ref().unwrap();
    assert_eq!(login.steps[2].status, StepStatus::Passed);

    let summary_path = write_suite_summary(dir.path(), &report).await.unwrap();
    assert!(summary_path.ends_with("test_summary.txt"));

    let summary = std::fs::read_to_string(summary_path).unwrap();
    assert!(summary.starts_with("Login: FAIL\nSmoke / Basic: PASS"));

    assert!(dir.path().join("log_Login.txt").exists());
    assert!(dir.path().join("report_Smoke___Basic.html").exists());
    assert!(dir.path().join("combined_report.html").exists());
    assert!(dir.path().join("test_summary.json").exists());
}

#[tokio::test]
async fn test_parallel_summary_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let suite = Suite::from_json_str(SUITE_JSON).unwrap();

    let report = SuiteRunner::new(registry().await)
        .with_mode(ExecutionMode::Parallel {
            max_concurrent: Some(4),
        })
        .run(&suite)
        .await;

    let path = write_suite_summary(dir.path(), &report).await.unwrap();
    assert!(path.ends_with("test_summary_parallel.txt"));
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("Total execution time (Parallel)"));
}

#[tokio::test]
async fn test_apply_report_updates_case_snapshot() {
    let mut suite = Suite::from_json_str(SUITE_JSON).unwrap();
    let runner = CaseRunner::new(registry().await);

    let report = runner.run(suite.get("Login").unwrap()).await;
    let case = suite.get_mut("Login").unwrap();
    case.apply_report(&report);

    assert_eq!(case.last_result, CaseStatus::Fail);
    assert_eq!(case.step_times.len(), 3);
    assert!(case.step_times.iter().all(|t| t.is_some()));

    // 编辑步骤后快照失效
    case.add_step(StepDefinition::new("extra", "Check"));
    assert_eq!(case.last_result, CaseStatus::Pending);
    assert!(case.step_times.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_run_shares_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let mut suite = Suite::new();
    let mut names: Vec<String> = (1..=30).map(|i| format!("case{}", i)).collect();
    names.push("a b".to_string());
    names.push("a_b".to_string());
    for name in &names {
        suite
            .insert_case(Case::with_steps(
                name,
                vec![
                    StepDefinition::new("first", "Check"),
                    StepDefinition::new("second", "Check").with_detail("ok", false),
                ],
            ))
            .unwrap();
    }

    let report = SuiteRunner::new(registry().await)
        .with_sink(Arc::new(FileSink::new(dir.path())))
        .with_mode(ExecutionMode::Parallel {
            max_concurrent: None,
        })
        .run(&suite)
        .await;

    assert_eq!(report.results.len(), names.len());
    assert!(report
        .results
        .values()
        .all(|outcome| outcome.verdict == CaseVerdict::Fail));

    // 每个用例一份日志和一份 HTML，外加汇总文件
    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, names.len() * 2 + 1);

    let mut headings: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("report_"))
        })
        .map(|path| {
            let html = std::fs::read_to_string(path).unwrap();
            let start = html.find("Test Case: ").unwrap() + "Test Case: ".len();
            let end = html[start..].find("</h2>").unwrap() + start;
            html[start..end].to_string()
        })
        .collect();
    headings.sort();
    let mut expected = names.clone();
    expected.sort();
    assert_eq!(headings, expected);

    let combined = std::fs::read_to_string(dir.path().join("combined_report.html")).unwrap();
    for name in &names {
        assert_eq!(
            combined.matches(&format!("<h2>Test Case: {}</h2>", name)).count(),
            1,
            "{}",
            name
        );
    }
}
