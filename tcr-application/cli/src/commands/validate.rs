//! Validate 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use tcr_executor::{ActionRegistry, Suite};

use super::common::load_suite;

/// 套件定义中的问题
#[derive(Debug, PartialEq)]
struct Issue {
    case: String,
    step: usize,
    message: String,
}

/// 检查套件定义
///
/// 未知步骤类型、无法识别的运行条件、目标步骤缺失或指向后续步骤、无效的延迟。
async fn find_issues(suite: &Suite, registry: &ActionRegistry) -> Vec<Issue> {
    let mut issues = Vec::new();

    for case in suite.cases() {
        for (position, step) in case.steps.iter().enumerate() {
            let index = position + 1;
            let mut push = |message: String| {
                issues.push(Issue {
                    case: case.name.clone(),
                    step: index,
                    message,
                })
            };

            if !registry.is_registered(&step.step_type).await {
                push(format!("未知的步骤类型: {}", step.step_type));
            }

            if !step.run_condition.is_recognized() {
                push(format!(
                    "无法识别的运行条件: {} (运行时按 Always 处理)",
                    step.run_condition
                ));
            }

            if step.run_condition.needs_target() {
                match step.target_index() {
                    None => push(format!("{} 需要 target_step", step.run_condition)),
                    Some(target) if target >= index => {
                        push(format!("target_step {} 不在当前步骤之前", target))
                    }
                    Some(_) => {}
                }
            }

            if let Err(e) = step.delay_secs() {
                push(e.to_string());
            }
        }
    }

    issues
}

pub async fn handle(file: &str) -> Result<()> {
    let suite = load_suite(file)?;
    let registry = tcr_actions::builtin_registry()
        .await
        .context("注册内置步骤类型失败")?;

    let issues = find_issues(&suite, &registry).await;

    if issues.is_empty() {
        println!("{} 套件定义有效", "✓".green().bold());
        return Ok(());
    }

    println!();
    for issue in &issues {
        println!(
            "{} {} 步骤 {}: {}",
            "✗".red().bold(),
            issue.case.cyan(),
            issue.step,
            issue.message
        );
    }
    println!();

    anyhow::bail!("发现 {} 个问题", issues.len())
}
