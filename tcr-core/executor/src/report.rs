//! 测试报告
//!
//! 用例执行器在运行期间独占构建 `CaseReport`，结束后一次性交给报告输出端，
//! 并发运行的用例因此不会在同一份报告内交错。

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::suite::{ExecutionMode, SuiteReport};
use crate::{ExecutorError, History, Result, StepResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 用例 / 套件级结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseVerdict {
    Pass,
    Fail,
    /// 用例任务本身崩溃 (仅由套件执行器产生)
    Error,
}

impl CaseVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, CaseVerdict::Pass)
    }
}

impl fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseVerdict::Pass => f.write_str("PASS"),
            CaseVerdict::Fail => f.write_str("FAIL"),
            CaseVerdict::Error => f.write_str("ERROR"),
        }
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn from_result(result: StepResult) -> Self {
        match result {
            StepResult::Pass => StepStatus::Passed,
            StepResult::Fail => StepStatus::Failed,
            StepResult::Error => StepStatus::Error,
        }
    }

    pub fn result(&self) -> Option<StepResult> {
        match self {
            StepStatus::Passed => Some(StepResult::Pass),
            StepStatus::Failed => Some(StepResult::Fail),
            StepStatus::Error => Some(StepResult::Error),
            StepStatus::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepStatus::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Passed => f.write_str("PASS"),
            StepStatus::Failed => f.write_str("FAIL"),
            StepStatus::Error => f.write_str("ERROR"),
            StepStatus::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// 步骤报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 1 起始序号
    pub index: usize,

    pub name: String,

    pub category: String,

    pub step_type: String,

    /// 声明的运行条件
    pub condition: String,

    pub status: StepStatus,

    /// 执行器返回的信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 执行器输出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// 跳过原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// 耗时（秒），包含执行前延迟
    pub elapsed_seconds: f64,
}

impl StepReport {
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// 用例统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub passed: usize,
    /// FAIL 与 ERROR 合计
    pub failed: usize,
    /// 已执行步骤耗时之和（秒）
    pub total_time: f64,
}

/// 用例执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub case_name: String,

    pub started_at: DateTime<Local>,

    pub verdict: CaseVerdict,

    pub steps: Vec<StepReport>,

    pub summary: CaseSummary,

    /// 带时间戳的运行记录
    pub transcript: Vec<String>,

    /// 本次运行的步骤历史
    pub history: History,
}

impl CaseReport {
    pub fn new(case_name: &str) -> Self {
        Self {
            case_name: case_name.to_string(),
            started_at: Local::now(),
            verdict: CaseVerdict::Pass,
            steps: Vec::new(),
            summary: CaseSummary::default(),
            transcript: Vec::new(),
            history: History::new(),
        }
    }

    /// 追加一行带时间戳的运行记录
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.transcript.push(format!(
            "[{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            line.as_ref()
        ));
    }

    pub fn add_step(&mut self, step: StepReport) {
        self.summary.total += 1;

        match step.status {
            StepStatus::Skipped => self.summary.skipped += 1,
            StepStatus::Passed => {
                self.summary.executed += 1;
                self.summary.passed += 1;
                self.summary.total_time += step.elapsed_seconds;
            }
            StepStatus::Failed | StepStatus::Error => {
                self.summary.executed += 1;
                self.summary.failed += 1;
                self.summary.total_time += step.elapsed_seconds;
                self.verdict = CaseVerdict::Fail;
            }
        }

        self.steps.push(step);
    }

    /// 用例通过: 所有已执行步骤均为 PASS
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

/// 报告输出端
///
/// 每次调用携带一个完整的用例报告；实现必须能承受并发调用。
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn record(&self, report: &CaseReport) -> Result<()>;
}

/// 内存报告输出端
#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<CaseReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<CaseReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn record(&self, report: &CaseReport) -> Result<()> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

/// 文件报告输出端
///
/// 每个用例写出 `log_<name>.txt` 与 `report_<name>.html`，
/// 并重写汇总文件 `combined_report.html`。
/// 不同用例名转换后相同时，后出现的用例加 `_2`、`_3` 等后缀。
pub struct FileSink {
    output_dir: PathBuf,
    state: Mutex<FileSinkState>,
}

#[derive(Default)]
struct FileSinkState {
    sections: Vec<String>,
    /// 用例名 -> 文件名主干
    stems: HashMap<String, String>,
    used: HashSet<String>,
}

impl FileSinkState {
    /// 同一用例重复记录时沿用原文件名
    fn stem_for(&mut self, case_name: &str) -> String {
        if let Some(stem) = self.stems.get(case_name) {
            return stem.clone();
        }

        let base = safe_file_name(case_name);
        let mut stem = base.clone();
        let mut suffix = 2;
        while self.used.contains(&stem) {
            stem = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        self.used.insert(stem.clone());
        self.stems.insert(case_name.to_string(), stem.clone());
        stem
    }
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            state: Mutex::new(FileSinkState::default()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn record(&self, report: &CaseReport) -> Result<()> {
        // 整个写入过程持锁，保证汇总文件内各用例段落完整
        let mut state = self.state.lock().await;

        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = state.stem_for(&report.case_name);
        let log_path = self.output_dir.join(format!("log_{}.txt", stem));
        let html_path = self.output_dir.join(format!("report_{}.html", stem));

        tokio::fs::write(&log_path, report.transcript.join("\n")).await?;

        let section = render_html(report);
        tokio::fs::write(&html_path, format!("<html><body>\n{}\n</body></html>", section))
            .await?;
        debug!("已写入用例报告: {}", html_path.display());

        state.sections.push(section);
        let combined_path = self.output_dir.join("combined_report.html");
        tokio::fs::write(
            &combined_path,
            format!(
                "<html><body>\n<h1>Combined Test Report</h1>\n{}\n</body></html>",
                state.sections.join("\n<hr>\n")
            ),
        )
        .await?;

        Ok(())
    }
}

/// 用例名转为安全文件名: `[A-Za-z0-9_-]` 以外的字符替换为 `_`
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 渲染用例报告的 HTML 片段
pub fn render_html(report: &CaseReport) -> String {
    let mut html = Vec::new();
    html.push(format!(
        "<h2>Test Case: {}</h2>\n<ul>",
        escape_html(&report.case_name)
    ));

    for step in &report.steps {
        let color = match step.status {
            StepStatus::Passed => "#10b981",
            StepStatus::Failed | StepStatus::Error => "#ef4444",
            StepStatus::Skipped => "#888",
        };
        let detail = match step.status {
            StepStatus::Skipped => step.skip_reason.clone().unwrap_or_default(),
            _ => step.message.clone().unwrap_or_default(),
        };
        html.push(format!(
            "<li style='color: {};'>Step {}: {} [{}] {} ({:.2}s) - {}</li>",
            color,
            step.index,
            escape_html(&step.name),
            escape_html(&step.category),
            step.status,
            step.elapsed_seconds,
            escape_html(&detail)
        ));
    }
    html.push("</ul>".to_string());

    let summary = &report.summary;
    let status_color = if report.passed() { "#10b981" } else { "#ef4444" };
    html.push("<div style='margin-top: 20px; padding: 15px; background: #f8fafc;'>".to_string());
    html.push("<h3 style='margin-top: 0;'>Execution Summary</h3>".to_string());
    html.push(format!(
        "<p><strong>Status:</strong> <span style='color: {};'>{}</span></p>",
        status_color,
        if report.passed() { "PASSED" } else { "FAILED" }
    ));
    html.push(format!("<p><strong>Total Steps:</strong> {}</p>", summary.total));
    html.push(format!("<p><strong>Executed:</strong> {}</p>", summary.executed));
    html.push(format!("<p><strong>Skipped:</strong> {}</p>", summary.skipped));
    html.push(format!(
        "<p><strong>Total Execution Time:</strong> {:.2}s</p>",
        summary.total_time
    ));
    html.push(format!(
        "<p><strong>Timestamp:</strong> {}</p>",
        report.started_at.format(TIMESTAMP_FORMAT)
    ));
    html.push("</div>".to_string());

    html.join("\n")
}

/// 写出套件汇总文件，返回文本汇总路径
///
/// 串行模式写 `test_summary.txt`，并行模式写 `test_summary_parallel.txt`；
/// 两种模式都额外写 `test_summary.json`。
pub async fn write_suite_summary<P: AsRef<Path>>(dir: P, report: &SuiteReport) -> Result<PathBuf> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let text_name = match report.mode {
        ExecutionMode::Sequential => "test_summary.txt",
        ExecutionMode::Parallel { .. } => "test_summary_parallel.txt",
    };
    let text_path = dir.join(text_name);
    tokio::fs::write(&text_path, report.summary_text()).await?;

    let json = report
        .to_json()
        .map_err(|e| ExecutorError::SerdeError(e.to_string()))?;
    tokio::fs::write(dir.join("test_summary.json"), json).await?;

    info!("套件汇总已写入: {}", text_path.display());
    Ok(text_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, status: StepStatus, elapsed: f64) -> StepReport {
        StepReport {
            index,
            name: format!("Step {}", index),
            category: "General".to_string(),
            step_type: "Run Command".to_string(),
            condition: "Always".to_string(),
            status,
            message: Some("done".to_string()),
            output: None,
            skip_reason: status.is_skipped().then(|| "Marked as Skip".to_string()),
            elapsed_seconds: elapsed,
        }
    }

    #[test]
    fn test_add_step_counts() {
        let mut report = CaseReport::new("case");
        report.add_step(step(1, StepStatus::Passed, 1.0));
        report.add_step(step(2, StepStatus::Skipped, 0.0));
        report.add_step(step(3, StepStatus::Failed, 0.5));

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.executed, 2);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.failed, 1);
        assert!((report.summary.total_time - 1.5).abs() < f64::EPSILON);
        assert_eq!(report.verdict, CaseVerdict::Fail);
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("Login / Smoke #1"), "Login___Smoke__1");
        assert_eq!(safe_file_name("ok-name_2"), "ok-name_2");
    }

    #[test]
    fn test_render_html_escapes() {
        let mut report = CaseReport::new("<b>case</b>");
        report.add_step(step(1, StepStatus::Skipped, 0.0));
        let html = render_html(&report);
        assert!(html.contains("&lt;b&gt;case&lt;/b&gt;"));
        assert!(html.contains("Marked as Skip"));
        assert!(html.contains("PASSED"));
        assert!(html.contains("<p><strong>Skipped:</strong> 1</p>"));
    }

    #[test]
    fn test_transcript_is_timestamped() {
        let mut report = CaseReport::new("case");
        report.log("Running case");
        assert!(report.transcript[0].starts_with('['));
        assert!(report.transcript[0].ends_with("] Running case"));
    }

    #[tokio::test]
    async fn test_file_sink_keeps_colliding_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        for name in ["a b", "a_b", "a b", "a?b"] {
            let mut report = CaseReport::new(name);
            report.log(format!("case {}", name));
            sink.record(&report).await.unwrap();
        }

        let read = |file: &str| std::fs::read_to_string(dir.path().join(file)).unwrap();
        assert!(read("log_a_b.txt").ends_with("case a b"));
        assert!(read("log_a_b_2.txt").ends_with("case a_b"));
        assert!(read("log_a_b_3.txt").ends_with("case a?b"));
        assert!(read("report_a_b_2.html").contains("Test Case: a_b"));
        assert!(!dir.path().join("log_a_b_4.txt").exists());
    }

    #[tokio::test]
    async fn test_file_sink_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let mut first = CaseReport::new("first case");
        first.log("hello");
        first.add_step(step(1, StepStatus::Passed, 0.1));
        sink.record(&first).await.unwrap();

        let second = CaseReport::new("second");
        sink.record(&second).await.unwrap();

        let log = std::fs::read_to_string(dir.path().join("log_first_case.txt")).unwrap();
        assert!(log.contains("hello"));
        assert!(dir.path().join("report_first_case.html").exists());

        let combined = std::fs::read_to_string(dir.path().join("combined_report.html")).unwrap();
        assert!(combined.contains("Test Case: first case"));
        assert!(combined.contains("Test Case: second"));
    }
}
