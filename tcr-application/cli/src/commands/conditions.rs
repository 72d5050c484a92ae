//! Conditions 命令处理

use colored::Colorize;
use tcr_executor::RunCondition;

pub fn handle() {
    println!("{}\n", "运行条件:".bold());

    for condition in RunCondition::ALL.iter() {
        if condition.needs_target() {
            println!(
                "  {}  {}",
                condition.as_str().cyan(),
                "(需要 target_step)".bright_black()
            );
        } else {
            println!("  {}", condition.as_str().cyan());
        }
    }
}
