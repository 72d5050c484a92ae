//! Run 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use tcr_executor::{
    write_suite_summary, CaseReport, CaseVerdict, ExecutionMode, FileSink, StepStatus, SuiteReport,
    SuiteRunner,
};

use super::common::{load_suite, spinner};
use super::output::{print_json, print_yaml, print_table, TableRow};
use crate::config::{expand_path, CliConfig};

/// 汇总表中的一行
#[derive(Serialize)]
struct CaseResultRow {
    case: String,
    verdict: String,
    executed: usize,
    skipped: usize,
    elapsed_seconds: f64,
}

impl TableRow for CaseResultRow {
    fn headers() -> Vec<&'static str> {
        vec!["用例", "结论", "执行", "跳过", "耗时(s)"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.case.clone(),
            self.verdict.clone(),
            self.executed.to_string(),
            self.skipped.to_string(),
            format!("{:.2}", self.elapsed_seconds),
        ]
    }
}

/// 根据命令行参数和配置确定执行模式
fn resolve_mode(args: &crate::RunArgs, config: &CliConfig) -> ExecutionMode {
    if !(args.parallel || config.parallel.enabled) {
        return ExecutionMode::Sequential;
    }

    let max_concurrent = match args.max_concurrent {
        Some(0) => None,
        Some(n) => Some(n),
        None => config.max_concurrent(),
    };
    ExecutionMode::Parallel { max_concurrent }
}

pub async fn handle(args: crate::RunArgs, config: &CliConfig) -> Result<()> {
    let suite = load_suite(&args.file)?;

    let registry = tcr_actions::builtin_registry()
        .await
        .context("注册内置步骤类型失败")?;

    let report_dir = args
        .report_dir
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(|| config.report_dir());
    let mode = resolve_mode(&args, config);

    info!("报告目录: {}, 执行模式: {}", report_dir.display(), mode);

    let runner = SuiteRunner::new(registry)
        .with_sink(Arc::new(FileSink::new(&report_dir)))
        .with_mode(mode);

    let spinner = spinner(format!("执行用例 ({})...", mode))?;
    let report = if args.cases.is_empty() {
        runner.run(&suite).await
    } else {
        runner.run_cases(&suite, &args.cases).await?
    };
    spinner.finish_with_message(format!("{} 执行完成", "✓".green().bold()));

    let summary_path = write_suite_summary(&report_dir, &report)
        .await
        .context("写入套件汇总失败")?;

    match args.format.as_str() {
        "json" => print_json(&report)?,
        "yaml" => print_yaml(&report)?,
        _ => print_report(&report),
    }

    println!(
        "\n报告目录: {}\n汇总文件: {}",
        report_dir.display().to_string().bright_black(),
        summary_path.display().to_string().bright_black()
    );

    if !report.all_passed() {
        anyhow::bail!(
            "{}/{} 个用例未通过",
            report.results.len() - report.passed_count(),
            report.results.len()
        );
    }

    Ok(())
}

fn print_report(report: &SuiteReport) {
    for (name, outcome) in &report.results {
        println!("\n{}", "=".repeat(60));
        println!("用例: {}  {}", name.cyan().bold(), verdict_label(outcome.verdict));
        println!("{}", "=".repeat(60));

        match &outcome.report {
            Some(case_report) => print_case(case_report),
            None => {
                if let Some(error) = &outcome.error {
                    println!("   错误: {}", error.red());
                }
            }
        }
    }

    let rows: Vec<CaseResultRow> = report
        .results
        .iter()
        .map(|(name, outcome)| CaseResultRow {
            case: name.clone(),
            verdict: outcome.verdict.to_string(),
            executed: outcome
                .report
                .as_ref()
                .map_or(0, |r| r.summary.executed),
            skipped: outcome.report.as_ref().map_or(0, |r| r.summary.skipped),
            elapsed_seconds: outcome.elapsed_seconds,
        })
        .collect();

    println!("\n{}", "执行汇总".bold());
    println!();
    print_table(&rows);
    println!();
    println!(
        "模式: {}  开始时间: {}  总耗时: {:.2}s",
        report.mode,
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        report.total_elapsed_seconds
    );

    let status = if report.all_passed() {
        format!("{} 全部用例通过", "✓".green().bold())
    } else {
        format!(
            "{} {}/{} 个用例通过",
            "✗".red().bold(),
            report.passed_count(),
            report.results.len()
        )
    };
    println!("{}", status);
}

fn print_case(report: &CaseReport) {
    for step in &report.steps {
        let icon = match step.status {
            StepStatus::Passed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Error => "!".red(),
            StepStatus::Skipped => "⊘".yellow(),
        };

        println!(
            "{} 步骤 {}: {} [{}] {}",
            icon.bold(),
            step.index.to_string().bright_black(),
            step.name,
            step.category.bright_black(),
            step.step_type.bright_black()
        );

        if let Some(reason) = &step.skip_reason {
            println!("   跳过: {}", reason.yellow());
        }
        if let Some(message) = &step.message {
            let message = match step.status {
                StepStatus::Passed => message.normal(),
                _ => message.red(),
            };
            println!("   信息: {}", message);
        }
        if !step.status.is_skipped() {
            println!("   耗时: {:.2}s", step.elapsed_seconds);
        }
    }

    println!(
        "\n步骤: 共 {}, 执行 {}, 跳过 {}, 通过 {}, 失败 {}  耗时 {:.2}s",
        report.summary.total,
        report.summary.executed,
        report.summary.skipped,
        report.summary.passed.to_string().green(),
        report.summary.failed.to_string().red(),
        report.summary.total_time
    );
}

fn verdict_label(verdict: CaseVerdict) -> colored::ColoredString {
    match verdict {
        CaseVerdict::Pass => "PASS".green().bold(),
        CaseVerdict::Fail => "FAIL".red().bold(),
        CaseVerdict::Error => "ERROR".red().bold(),
    }
}
