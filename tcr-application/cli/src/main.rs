//! TCR CLI 应用

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "tcr")]
#[command(about = "TCR - 条件测试用例执行工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (默认读取配置文件，RUST_LOG 优先)
    #[arg(short, long)]
    log_level: Option<String>,

    /// 配置文件路径 (也可通过 TCR_CONFIG 指定)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行测试套件
    Run(RunArgs),

    /// 列出套件中的用例与步骤
    List {
        /// 套件文件路径 (.json/.yaml/.yml)
        file: String,

        /// 输出格式 (table/json/yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// 检查套件定义
    Validate {
        /// 套件文件路径
        file: String,
    },

    /// 列出所有运行条件
    Conditions,

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// 显示当前生效的配置
    Show,
    /// 写出默认配置文件
    Init {
        /// 覆盖已存在的配置文件
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// 套件文件路径 (.json/.yaml/.yml)
    file: String,

    /// 只运行指定用例 (可重复)
    #[arg(long = "case")]
    cases: Vec<String>,

    /// 并行运行用例
    #[arg(short, long)]
    parallel: bool,

    /// 最大并发用例数 (0 表示不限制)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// 报告输出目录
    #[arg(long)]
    report_dir: Option<String>,

    /// 汇总输出格式 (table/json/yaml)
    #[arg(short = 'f', long, default_value = "table")]
    format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())?;

    // 初始化日志
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("TCR CLI 启动");

    // 处理命令
    match cli.command {
        Commands::Run(args) => commands::run::handle(args, &config).await?,
        Commands::List { file, format } => commands::list::handle(&file, &format)?,
        Commands::Validate { file } => commands::validate::handle(&file).await?,
        Commands::Conditions => commands::conditions::handle(),
        Commands::Config { action } => {
            commands::config::handle(action, cli.config.as_deref(), &config)?
        }
    }

    Ok(())
}
