//! TCR 执行器
//!
//! 条件步骤执行引擎: 按声明顺序执行测试用例的步骤，
//! 根据每个步骤的运行条件和本次运行的历史记录决定是否执行，
//! 并汇总用例级与套件级的结果。

pub mod condition;
pub mod history;
pub mod model;
pub mod registry;
pub mod report;
pub mod runner;
pub mod suite;

pub use condition::{evaluate, Decision};
pub use history::{History, HistorySummary, StepRunRecord};
pub use model::{
    Case, CaseStatus, RunCondition, StepDefinition, StepDetails, StepResult, Suite,
    DEFAULT_CATEGORY,
};
pub use registry::{ActionOutcome, ActionRegistry, StepAction};
pub use report::{
    render_html, safe_file_name, write_suite_summary, CaseReport, CaseSummary, CaseVerdict,
    FileSink, MemorySink, ReportSink, StepReport, StepStatus,
};
pub use runner::CaseRunner;
pub use suite::{CaseOutcome, ExecutionMode, SuiteReport, SuiteRunner};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("套件加载失败: {0}")]
    SuiteLoadFailed(String),

    #[error("用例不存在: {0}")]
    CaseNotFound(String),

    #[error("用例已存在: {0}")]
    CaseAlreadyExists(String),

    #[error("步骤索引越界: {index} (共 {len} 个步骤)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("步骤类型已注册: {0}")]
    ActionAlreadyRegistered(String),

    #[error("步骤类型未注册: {0}")]
    ActionNotFound(String),

    #[error("步骤执行失败: {0}")]
    StepExecutionFailed(String),

    #[error("无效的步骤延迟: {0}")]
    InvalidDelay(String),

    #[error("报告写入失败: {0}")]
    ReportError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
