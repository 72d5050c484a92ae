//! 公共工具函数模块

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tcr_executor::Suite;

/// 创建旋转进度提示
pub fn spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("进度条模板无效")?,
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// 加载套件文件，格式由扩展名决定
pub fn load_suite(file: &str) -> Result<Suite> {
    let spinner = spinner(format!("加载套件: {}", file))?;

    match Suite::from_file(file).with_context(|| format!("加载套件文件失败: {}", file)) {
        Ok(suite) => {
            spinner.finish_with_message(format!(
                "{} 套件加载成功: {} 个用例",
                "✓".green().bold(),
                suite.len().to_string().cyan()
            ));
            Ok(suite)
        }
        Err(e) => {
            spinner.finish_with_message(format!("{} 套件加载失败", "✗".red().bold()));
            Err(e)
        }
    }
}
