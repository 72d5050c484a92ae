//! 用例执行器
//!
//! 按声明顺序遍历步骤：求值运行条件，满足则执行，不满足则记为跳过。
//! 单个步骤的故障只会产生 ERROR 记录，用例总会跑完全部步骤。

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    evaluate, ActionRegistry, Case, CaseReport, History, ReportSink, StepDefinition, StepReport,
    StepResult, StepRunRecord, StepStatus,
};

/// 单个步骤的执行结果
struct StepOutcome {
    result: StepResult,
    message: String,
    output: String,
}

impl StepOutcome {
    fn error(detail: impl std::fmt::Display) -> Self {
        let message = format!("Step execution error: {}", detail);
        Self {
            result: StepResult::Error,
            output: message.clone(),
            message,
        }
    }
}

/// 用例执行器
#[derive(Clone)]
pub struct CaseRunner {
    registry: Arc<ActionRegistry>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl CaseRunner {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            sink: None,
        }
    }

    /// 设置报告输出端
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 运行用例
    ///
    /// 每次运行使用全新的历史记录；报告在结束后交给输出端一次。
    pub async fn run(&self, case: &Case) -> CaseReport {
        info!("开始执行用例: {} ({} 个步骤)", case.name, case.steps.len());

        let mut report = CaseReport::new(&case.name);
        let mut history = History::new();
        report.log(format!("Running test case: {}", case.name));

        for (position, step) in case.steps.iter().enumerate() {
            let index = position + 1;
            let name = step.display_name(index);

            let decision = evaluate(index, &step.run_condition, &history, step.target_index());

            if !decision.should_run {
                let reason = decision.skip_reason.unwrap_or_default();
                info!("跳过步骤 {}: {} - {}", index, name, reason);
                report.log(format!("Skipping step {}: {} - {}", index, name, reason));

                history.push(StepRunRecord::skipped(index, &name));
                report.add_step(StepReport {
                    index,
                    name,
                    category: step.category.clone(),
                    step_type: step.step_type.clone(),
                    condition: step.run_condition.to_string(),
                    status: StepStatus::Skipped,
                    message: None,
                    output: None,
                    skip_reason: Some(reason),
                    elapsed_seconds: 0.0,
                });
                continue;
            }

            if !step.run_condition.is_recognized() {
                warn!(
                    "步骤 {} 的运行条件无法识别: {}，按执行处理",
                    index, step.run_condition
                );
            }

            info!("执行步骤 {}: {} [{}]", index, name, step.step_type);
            report.log(format!(
                "Executing step {}: {} [{}] (condition: {})",
                index, name, step.category, step.run_condition
            ));

            let started = Instant::now();
            let outcome = self.execute_step(index, step, &mut report).await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome.result {
                StepResult::Pass => info!("步骤 {} 通过 ({:.2}s)", index, elapsed),
                StepResult::Fail => warn!("步骤 {} 失败: {}", index, outcome.message),
                StepResult::Error => error!("步骤 {} 出错: {}", index, outcome.message),
            }
            report.log(format!(
                "Step {} {} ({:.2}s): {}",
                index, outcome.result, elapsed, outcome.message
            ));

            history.push(StepRunRecord::executed(index, &name, outcome.result));
            report.add_step(StepReport {
                index,
                name,
                category: step.category.clone(),
                step_type: step.step_type.clone(),
                condition: step.run_condition.to_string(),
                status: StepStatus::from_result(outcome.result),
                message: Some(outcome.message),
                output: Some(outcome.output),
                skip_reason: None,
                elapsed_seconds: elapsed,
            });
        }

        report.history = history;

        if report.summary.executed == 0 {
            warn!("用例 {} 没有执行任何步骤，结论按 PASS 处理", case.name);
        }

        info!(
            "用例执行完成: {} - {} (执行 {}, 跳过 {}, {:.2}s)",
            case.name,
            report.verdict,
            report.summary.executed,
            report.summary.skipped,
            report.summary.total_time
        );
        report.log(format!(
            "Test case {} finished: {} (executed {}, skipped {}, {:.2}s)",
            case.name,
            report.verdict,
            report.summary.executed,
            report.summary.skipped,
            report.summary.total_time
        ));

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&report).await {
                warn!("用例 {} 报告写入失败: {}", case.name, e);
            }
        }

        report
    }

    /// 执行前延迟 + 动作执行；错误和 panic 都转换为 ERROR
    async fn execute_step(
        &self,
        index: usize,
        step: &StepDefinition,
        report: &mut CaseReport,
    ) -> StepOutcome {
        let delay = match step.delay_secs() {
            Ok(delay) => delay,
            Err(e) => return StepOutcome::error(e),
        };

        if delay > 0 {
            debug!("步骤 {} 延迟 {} 秒", index, delay);
            report.log(format!("Waiting {}s before step {}", delay, index));
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        let execution = self.registry.execute(&step.step_type, &step.details);

        match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(Ok(outcome)) => StepOutcome {
                result: if outcome.passed {
                    StepResult::Pass
                } else {
                    StepResult::Fail
                },
                message: outcome.message,
                output: outcome.output,
            },
            Ok(Err(e)) => StepOutcome::error(e),
            Err(panic) => StepOutcome::error(panic_message(panic.as_ref())),
        }
    }
}

/// 提取 panic 负载中的文本
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
