//! List 命令处理

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use super::common::load_suite;
use super::output::{output_formatted, TableRow};

/// 步骤列表中的一行
#[derive(Serialize)]
struct StepRow {
    case: String,
    index: usize,
    name: String,
    step_type: String,
    category: String,
    condition: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    target_step: String,
}

impl TableRow for StepRow {
    fn headers() -> Vec<&'static str> {
        vec!["用例", "序号", "名称", "类型", "分类", "运行条件"]
    }

    fn row(&self) -> Vec<String> {
        let condition = if self.target_step.is_empty() {
            self.condition.clone()
        } else {
            format!("{} ({})", self.condition, self.target_step)
        };
        vec![
            self.case.clone(),
            self.index.to_string(),
            self.name.clone(),
            self.step_type.clone(),
            self.category.clone(),
            condition,
        ]
    }
}

pub fn handle(file: &str, format: &str) -> Result<()> {
    let suite = load_suite(file)?;

    if suite.is_empty() {
        println!("{}", "套件中没有任何用例".yellow());
        return Ok(());
    }

    let rows: Vec<StepRow> = suite
        .cases()
        .flat_map(|case| {
            case.steps
                .iter()
                .enumerate()
                .map(move |(position, step)| StepRow {
                    case: case.name.clone(),
                    index: position + 1,
                    name: step.display_name(position + 1),
                    step_type: step.step_type.clone(),
                    category: step.category.clone(),
                    condition: step.run_condition.to_string(),
                    target_step: step.target_step.clone(),
                })
        })
        .collect();

    if format == "table" {
        println!();
        for case in suite.cases() {
            println!(
                "{}  {} 个步骤",
                case.name.cyan().bold(),
                case.steps.len().to_string().yellow()
            );
        }
        println!();
    }

    output_formatted(&rows, format)
}
