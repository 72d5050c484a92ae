//! TCR 内置动作
//!
//! 文件与归档操作、命令/进程与系统资源检查、日志检查步骤执行器。
//! 预期内的失败返回 `ActionOutcome::fail`，只有意外的 I/O 故障才返回错误。

pub mod file_ops;
pub mod log_check;
pub mod params;
pub mod system_ops;

use std::sync::Arc;
use tcr_executor::{ActionRegistry, ExecutorError};
use thiserror::Error;
use tracing::info;

pub use file_ops::{
    CheckFileExists, CompareFiles, CopyFile, CreateDirectory, DeleteFile, ExtractArchive, MoveFile,
    RenameFile, WaitForFile,
};
pub use log_check::CheckLogFile;
pub use system_ops::{
    CheckDiskSpace, CheckMemory, CheckProcessRunning, RunCommand, StartProcess, StopProcess,
};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("正则表达式错误: {0}")]
    RegexError(#[from] regex::Error),

    #[error("参数无效: {0}")]
    InvalidParameter(String),

    #[error("后台任务失败: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, ActionError>;

impl From<ActionError> for ExecutorError {
    fn from(e: ActionError) -> Self {
        ExecutorError::StepExecutionFailed(e.to_string())
    }
}

/// 注册全部内置步骤类型
pub async fn register_builtin(registry: &ActionRegistry) -> tcr_executor::Result<()> {
    registry.register("Copy File", Arc::new(CopyFile)).await?;
    registry.register("Move File", Arc::new(MoveFile)).await?;
    registry
        .register("Delete File/Folder", Arc::new(DeleteFile))
        .await?;
    registry.register("Rename File", Arc::new(RenameFile)).await?;
    registry
        .register("Create Directory", Arc::new(CreateDirectory))
        .await?;
    registry
        .register("Check File Exists", Arc::new(CheckFileExists))
        .await?;
    registry.register("Compare Files", Arc::new(CompareFiles)).await?;
    registry.register("Wait for File", Arc::new(WaitForFile)).await?;
    registry
        .register("Extract Archive", Arc::new(ExtractArchive))
        .await?;
    registry.register("Run Command", Arc::new(RunCommand)).await?;
    registry.register("Start Process", Arc::new(StartProcess)).await?;
    registry.register("Stop Process", Arc::new(StopProcess)).await?;
    registry
        .register("Check Process Running", Arc::new(CheckProcessRunning))
        .await?;
    registry
        .register("Check Disk Space", Arc::new(CheckDiskSpace))
        .await?;
    registry.register("Check Memory", Arc::new(CheckMemory)).await?;
    registry
        .register("Check Log File", Arc::new(CheckLogFile::new()?))
        .await?;

    info!("内置步骤类型注册完成");
    Ok(())
}

/// 创建已注册全部内置步骤类型的注册表
pub async fn builtin_registry() -> tcr_executor::Result<Arc<ActionRegistry>> {
    let registry = ActionRegistry::new();
    register_builtin(&registry).await?;
    Ok(Arc::new(registry))
}
