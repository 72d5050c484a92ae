//! CLI 配置管理
//!
//! TOML 文件，默认位置 ~/.config/tcr/config.toml，
//! 可由 `--config` 或环境变量 `TCR_CONFIG` 覆盖。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "TCR_CONFIG";

/// CLI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// 报告输出目录
    #[serde(default = "default_report_dir")]
    pub report_dir: String,

    /// 默认日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 并行执行设置
    #[serde(default)]
    pub parallel: ParallelConfig,

    /// 配置版本
    #[serde(default = "default_version")]
    pub version: String,
}

/// 并行执行设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// 默认以并行模式运行
    #[serde(default)]
    pub enabled: bool,

    /// 最大并发用例数，0 表示不限制
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_report_dir() -> String {
    "./reports".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_max_concurrent() -> usize {
    10
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            log_level: default_log_level(),
            parallel: ParallelConfig::default(),
            version: default_version(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path(override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path {
            return Ok(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(shellexpand::tilde(&path).into_owned()));
            }
        }

        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("tcr").join("config.toml"))
    }

    /// 加载配置，文件不存在时使用默认值
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let path = Self::config_path(override_path)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    /// 保存配置
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(path, content).with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(())
    }

    /// 报告目录 (展开 `~`)
    pub fn report_dir(&self) -> PathBuf {
        expand_path(&self.report_dir)
    }

    /// 并行模式下的并发上限，None 表示不限制
    pub fn max_concurrent(&self) -> Option<usize> {
        Some(self.parallel.max_concurrent).filter(|n| *n > 0)
    }
}

/// 展开路径中的 `~`
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
