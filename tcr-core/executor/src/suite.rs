//! 套件执行器
//!
//! 每个用例在独立的 tokio 任务中运行，拥有自己的历史记录。
//! 结果按套件声明顺序汇总，与完成顺序无关。

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::runner::panic_message;
use crate::{
    ActionRegistry, Case, CaseReport, CaseRunner, CaseVerdict, ExecutorError, ReportSink, Result,
    Suite,
};

/// 套件执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    /// 逐个运行，前一个用例结束后才开始下一个
    #[default]
    Sequential,

    /// 每个用例一个任务；`max_concurrent` 为 None 时不限制并发数
    Parallel { max_concurrent: Option<usize> },
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("Sequential"),
            ExecutionMode::Parallel {
                max_concurrent: Some(n),
            } => write!(f, "Parallel (max {})", n),
            ExecutionMode::Parallel {
                max_concurrent: None,
            } => f.write_str("Parallel"),
        }
    }
}

/// 单个用例在套件中的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub verdict: CaseVerdict,

    /// 用例运行耗时（秒），不含排队等待
    pub elapsed_seconds: f64,

    /// 用例任务崩溃时的错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<CaseReport>,
}

/// 套件执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: Uuid,

    pub mode: ExecutionMode,

    pub started_at: DateTime<Local>,

    /// 用例名 -> 结果，按套件声明顺序
    pub results: IndexMap<String, CaseOutcome>,

    pub total_elapsed_seconds: f64,
}

impl SuiteReport {
    /// 用例名 -> 结论
    pub fn verdicts(&self) -> IndexMap<String, CaseVerdict> {
        self.results
            .iter()
            .map(|(name, outcome)| (name.clone(), outcome.verdict))
            .collect()
    }

    pub fn passed_count(&self) -> usize {
        self.results.values().filter(|o| o.verdict.is_pass()).count()
    }

    /// 所有用例都通过
    pub fn all_passed(&self) -> bool {
        self.passed_count() == self.results.len()
    }

    /// 文本汇总: 每行 `名称: 结论`，末尾附总耗时
    pub fn summary_text(&self) -> String {
        let lines: Vec<String> = self
            .results
            .iter()
            .map(|(name, outcome)| match &outcome.error {
                Some(error) => format!("{}: {} - {}", name, outcome.verdict, error),
                None => format!("{}: {}", name, outcome.verdict),
            })
            .collect();

        let label = match self.mode {
            ExecutionMode::Sequential => "Total execution time",
            ExecutionMode::Parallel { .. } => "Total execution time (Parallel)",
        };

        format!(
            "{}\n\n{}: {:.2}s",
            lines.join("\n"),
            label,
            self.total_elapsed_seconds
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

/// 套件执行器
pub struct SuiteRunner {
    registry: Arc<ActionRegistry>,
    sink: Option<Arc<dyn ReportSink>>,
    mode: ExecutionMode,
}

impl SuiteRunner {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            sink: None,
            mode: ExecutionMode::Sequential,
        }
    }

    /// 设置报告输出端 (所有用例共享)
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// 运行套件中的全部用例
    pub async fn run(&self, suite: &Suite) -> SuiteReport {
        let cases: Vec<Case> = suite.cases().cloned().collect();
        self.run_all(cases).await
    }

    /// 运行指定用例，结果按套件声明顺序排列
    pub async fn run_cases(&self, suite: &Suite, names: &[String]) -> Result<SuiteReport> {
        for name in names {
            if suite.get(name).is_err() {
                return Err(ExecutorError::CaseNotFound(name.clone()));
            }
        }

        let cases: Vec<Case> = suite
            .cases()
            .filter(|case| names.contains(&case.name))
            .cloned()
            .collect();

        Ok(self.run_all(cases).await)
    }

    async fn run_all(&self, cases: Vec<Case>) -> SuiteReport {
        info!("开始执行套件: {} 个用例, 模式: {}", cases.len(), self.mode);

        let started_at = Local::now();
        let started = Instant::now();
        let mut results = IndexMap::new();

        let runner = self.case_runner();

        match self.mode {
            ExecutionMode::Sequential => {
                for case in cases {
                    let name = case.name.clone();
                    let handle = spawn_case(runner.clone(), case, None);
                    let outcome = join_case(&name, handle).await;
                    results.insert(name, outcome);
                }
            }
            ExecutionMode::Parallel { max_concurrent } => {
                let semaphore = max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1))));

                let handles: Vec<(String, JoinHandle<(CaseReport, f64)>)> = cases
                    .into_iter()
                    .map(|case| {
                        let name = case.name.clone();
                        (name, spawn_case(runner.clone(), case, semaphore.clone()))
                    })
                    .collect();

                for (name, handle) in handles {
                    let outcome = join_case(&name, handle).await;
                    results.insert(name, outcome);
                }
            }
        }

        let report = SuiteReport {
            run_id: Uuid::new_v4(),
            mode: self.mode,
            started_at,
            results,
            total_elapsed_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            "套件执行完成: {}/{} 通过, 耗时 {:.2}s",
            report.passed_count(),
            report.results.len(),
            report.total_elapsed_seconds
        );

        report
    }

    fn case_runner(&self) -> CaseRunner {
        let runner = CaseRunner::new(Arc::clone(&self.registry));
        match &self.sink {
            Some(sink) => runner.with_sink(Arc::clone(sink)),
            None => runner,
        }
    }
}

fn spawn_case(
    runner: CaseRunner,
    case: Case,
    semaphore: Option<Arc<Semaphore>>,
) -> JoinHandle<(CaseReport, f64)> {
    tokio::spawn(async move {
        // 信号量从不关闭，获取失败时直接运行
        let _permit = match semaphore {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        let started = Instant::now();
        let report = runner.run(&case).await;
        (report, started.elapsed().as_secs_f64())
    })
}

async fn join_case(name: &str, handle: JoinHandle<(CaseReport, f64)>) -> CaseOutcome {
    match handle.await {
        Ok((report, elapsed)) => {
            if !report.passed() {
                warn!("用例失败: {}", name);
            }
            CaseOutcome {
                verdict: report.verdict,
                elapsed_seconds: elapsed,
                error: None,
                report: Some(report),
            }
        }
        Err(e) => {
            let message = join_error_message(e);
            error!("用例任务异常终止: {} - {}", name, message);
            CaseOutcome {
                verdict: CaseVerdict::Error,
                elapsed_seconds: 0.0,
                error: Some(message),
                report: None,
            }
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        panic_message(e.into_panic().as_ref())
    } else {
        e.to_string()
    }
}
