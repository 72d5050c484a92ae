//! Config 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::config::CliConfig;

pub fn handle(action: crate::ConfigAction, path: Option<&Path>, config: &CliConfig) -> Result<()> {
    let path = CliConfig::config_path(path)?;

    match action {
        crate::ConfigAction::Show => {
            println!("{}", format!("配置文件: {:?}", path).bright_black());
            if !path.exists() {
                println!("{}", "(文件不存在，使用默认值)".bright_black());
            }
            println!();
            print!("{}", toml::to_string_pretty(config).context("序列化配置失败")?);
        }
        crate::ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("配置文件已存在: {:?} (使用 --force 覆盖)", path);
            }
            CliConfig::default().save_to(&path)?;
            println!("{} 已写入默认配置: {:?}", "✓".green().bold(), path);
        }
    }

    Ok(())
}
