//! 测试用例定义
//!
//! 步骤定义、用例与套件。步骤的 `type` 与 `details` 对执行引擎是不透明的，
//! 只会原样转交给注册表中对应的动作执行器。

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::report::{CaseReport, CaseVerdict};
use crate::{ExecutorError, Result};

/// 步骤参数 (表单层提取后的纯数据)
pub type StepDetails = serde_json::Map<String, serde_json::Value>;

/// 未指定分类时使用的分类
pub const DEFAULT_CATEGORY: &str = "General";

/// 步骤延迟在 details 中的键名
const STEP_DELAY_KEY: &str = "step_delay";

/// 单个步骤的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepResult {
    /// 执行成功
    Pass,
    /// 执行完成但预期未满足
    Fail,
    /// 执行过程本身出错
    Error,
}

impl StepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepResult::Pass => "PASS",
            StepResult::Fail => "FAIL",
            StepResult::Error => "ERROR",
        }
    }

    /// FAIL 与 ERROR 都视为失败
    pub fn is_failure(&self) -> bool {
        matches!(self, StepResult::Fail | StepResult::Error)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤运行条件
///
/// 条件集合是封闭的；无法识别的文本保留在 `Unrecognized` 中，
/// 求值时按"执行"处理。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunCondition {
    #[default]
    Always,
    IfPreviousPassed,
    IfPreviousFailed,
    IfPreviousSkipped,
    IfAllPreviousPassed,
    IfAnyPreviousFailed,
    IfSpecificStepPassed,
    IfSpecificStepFailed,
    OnErrorOnly,
    OnSuccessOnly,
    Skip,
    Unrecognized(String),
}

impl RunCondition {
    /// 全部已知条件，顺序与表单下拉框一致
    pub const ALL: [RunCondition; 11] = [
        RunCondition::Always,
        RunCondition::IfPreviousPassed,
        RunCondition::IfPreviousFailed,
        RunCondition::IfPreviousSkipped,
        RunCondition::IfAllPreviousPassed,
        RunCondition::IfAnyPreviousFailed,
        RunCondition::IfSpecificStepPassed,
        RunCondition::IfSpecificStepFailed,
        RunCondition::OnErrorOnly,
        RunCondition::OnSuccessOnly,
        RunCondition::Skip,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            RunCondition::Always => "Always",
            RunCondition::IfPreviousPassed => "If Previous Passed",
            RunCondition::IfPreviousFailed => "If Previous Failed",
            RunCondition::IfPreviousSkipped => "If Previous Skipped",
            RunCondition::IfAllPreviousPassed => "If All Previous Passed",
            RunCondition::IfAnyPreviousFailed => "If Any Previous Failed",
            RunCondition::IfSpecificStepPassed => "If Specific Step Passed",
            RunCondition::IfSpecificStepFailed => "If Specific Step Failed",
            RunCondition::OnErrorOnly => "On Error Only",
            RunCondition::OnSuccessOnly => "On Success Only",
            RunCondition::Skip => "Skip",
            RunCondition::Unrecognized(raw) => raw,
        }
    }

    /// 是否需要 `target_step`
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            RunCondition::IfSpecificStepPassed | RunCondition::IfSpecificStepFailed
        )
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, RunCondition::Unrecognized(_))
    }
}

impl FromStr for RunCondition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let condition = RunCondition::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .cloned()
            .unwrap_or_else(|| RunCondition::Unrecognized(s.to_string()));
        Ok(condition)
    }
}

impl From<String> for RunCondition {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(condition) => condition,
            Err(never) => match never {},
        }
    }
}

impl From<RunCondition> for String {
    fn from(condition: RunCondition) -> Self {
        condition.as_str().to_string()
    }
}

impl fmt::Display for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 显示名称 (可重复)
    #[serde(default)]
    pub name: String,

    /// 步骤类型，用于在注册表中查找执行器
    #[serde(rename = "type")]
    pub step_type: String,

    /// 步骤参数
    #[serde(default)]
    pub details: StepDetails,

    /// 运行条件
    #[serde(default)]
    pub run_condition: RunCondition,

    /// 分类 (Setup/Validation/Cleanup/...)
    #[serde(default = "default_category")]
    pub category: String,

    /// 目标步骤 (1 起始)，仅用于"指定步骤"类条件，空字符串表示未设置
    #[serde(default, deserialize_with = "deserialize_target_step")]
    pub target_step: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// 导出文件中 target_step 可能是字符串、数字或 null
fn deserialize_target_step<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

impl StepDefinition {
    pub fn new(name: &str, step_type: &str) -> Self {
        Self {
            name: name.to_string(),
            step_type: step_type.to_string(),
            details: StepDetails::new(),
            run_condition: RunCondition::Always,
            category: default_category(),
            target_step: String::new(),
        }
    }

    pub fn with_condition(mut self, condition: RunCondition) -> Self {
        self.run_condition = condition;
        self
    }

    pub fn with_target(mut self, target_step: usize) -> Self {
        self.target_step = target_step.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// 显示名称，未命名时使用 "Step N"
    pub fn display_name(&self, index: usize) -> String {
        if self.name.trim().is_empty() {
            format!("Step {}", index)
        } else {
            self.name.clone()
        }
    }

    /// 解析目标步骤；空、非数字或 0 视为未设置
    pub fn target_index(&self) -> Option<usize> {
        self.target_step
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|index| *index > 0)
    }

    /// 执行前延迟 (秒)
    ///
    /// 缺省或空值为 0；负数、小数或非数字返回错误。
    pub fn delay_secs(&self) -> Result<u64> {
        match self.details.get(STEP_DELAY_KEY) {
            None | Some(serde_json::Value::Null) => Ok(0),
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| ExecutorError::InvalidDelay(n.to_string())),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(0),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| ExecutorError::InvalidDelay(s.clone())),
            Some(other) => Err(ExecutorError::InvalidDelay(other.to_string())),
        }
    }
}

/// 用例最近一次运行的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    Pending,
    Pass,
    Fail,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Pending => f.write_str("Pending"),
            CaseStatus::Pass => f.write_str("PASS"),
            CaseStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// 测试用例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// 用例名称 (套件内唯一)
    pub name: String,

    /// 有序步骤
    #[serde(default)]
    pub steps: Vec<StepDefinition>,

    /// 最近一次运行结果
    #[serde(default)]
    pub last_result: CaseStatus,

    /// 最近一次运行中各步骤耗时 (秒)，跳过的步骤为 None
    #[serde(default)]
    pub step_times: Vec<Option<f64>>,
}

impl Case {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            last_result: CaseStatus::Pending,
            step_times: Vec::new(),
        }
    }

    pub fn with_steps(name: &str, steps: Vec<StepDefinition>) -> Self {
        Self {
            steps,
            ..Self::new(name)
        }
    }

    /// 追加步骤，返回其 1 起始序号
    pub fn add_step(&mut self, step: StepDefinition) -> usize {
        self.steps.push(step);
        self.invalidate();
        self.steps.len()
    }

    /// 删除步骤 (1 起始)
    pub fn remove_step(&mut self, index: usize) -> Result<StepDefinition> {
        let position = self.position(index)?;
        let step = self.steps.remove(position);
        self.invalidate();
        Ok(step)
    }

    /// 移动步骤 (1 起始)
    pub fn move_step(&mut self, from: usize, to: usize) -> Result<()> {
        let from = self.position(from)?;
        let to = self.position(to)?;
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.invalidate();
        Ok(())
    }

    pub fn clear_steps(&mut self) {
        self.steps.clear();
        self.invalidate();
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// 用本次运行报告覆盖"最近一次"快照
    pub fn apply_report(&mut self, report: &CaseReport) {
        self.last_result = match report.verdict {
            CaseVerdict::Pass => CaseStatus::Pass,
            CaseVerdict::Fail | CaseVerdict::Error => CaseStatus::Fail,
        };
        self.step_times = report
            .steps
            .iter()
            .map(|step| (!step.status.is_skipped()).then_some(step.elapsed_seconds))
            .collect();
    }

    /// 最近一次运行的总耗时
    pub fn total_time(&self) -> f64 {
        self.step_times.iter().flatten().sum()
    }

    fn position(&self, index: usize) -> Result<usize> {
        if index == 0 || index > self.steps.len() {
            return Err(ExecutorError::StepOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        Ok(index - 1)
    }

    fn invalidate(&mut self) {
        self.last_result = CaseStatus::Pending;
        self.step_times.clear();
    }
}

/// 测试套件: 用例名称 -> 用例，保持声明顺序
///
/// 导入导出格式为 `{"<用例名>": [步骤, ...]}`。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<String, Vec<StepDefinition>>",
    into = "IndexMap<String, Vec<StepDefinition>>"
)]
pub struct Suite {
    cases: IndexMap<String, Case>,
}

impl From<IndexMap<String, Vec<StepDefinition>>> for Suite {
    fn from(map: IndexMap<String, Vec<StepDefinition>>) -> Self {
        let cases = map
            .into_iter()
            .map(|(name, steps)| {
                let case = Case::with_steps(&name, steps);
                (name, case)
            })
            .collect();
        Self { cases }
    }
}

impl From<Suite> for IndexMap<String, Vec<StepDefinition>> {
    fn from(suite: Suite) -> Self {
        suite
            .cases
            .into_iter()
            .map(|(name, case)| (name, case.steps))
            .collect()
    }
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文件加载，按扩展名选择 JSON 或 YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::from_json_file(path),
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            _ => Err(ExecutorError::SuiteLoadFailed(format!(
                "不支持的套件文件格式，仅支持 .json/.yaml/.yml: {}",
                path.display()
            ))),
        }
    }

    /// 从 JSON 文件加载套件
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载套件
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 从 YAML 文件加载套件
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// 从 YAML 字符串加载套件
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 新建空用例
    pub fn new_case(&mut self, name: &str) -> Result<&mut Case> {
        self.insert_case(Case::new(name))?;
        self.get_mut(name)
    }

    /// 加入用例，名称必须唯一
    pub fn insert_case(&mut self, case: Case) -> Result<()> {
        if self.cases.contains_key(&case.name) {
            return Err(ExecutorError::CaseAlreadyExists(case.name));
        }
        self.cases.insert(case.name.clone(), case);
        Ok(())
    }

    /// 重命名用例，保持其位置
    pub fn rename_case(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.cases.contains_key(new) {
            return Err(ExecutorError::CaseAlreadyExists(new.to_string()));
        }
        let position = self
            .cases
            .get_index_of(old)
            .ok_or_else(|| ExecutorError::CaseNotFound(old.to_string()))?;
        let (_, mut case) = self
            .cases
            .shift_remove_index(position)
            .ok_or_else(|| ExecutorError::CaseNotFound(old.to_string()))?;
        case.rename(new);
        self.cases.shift_insert(position, new.to_string(), case);
        Ok(())
    }

    /// 删除用例
    pub fn delete_case(&mut self, name: &str) -> Result<Case> {
        self.cases
            .shift_remove(name)
            .ok_or_else(|| ExecutorError::CaseNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&Case> {
        self.cases
            .get(name)
            .ok_or_else(|| ExecutorError::CaseNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Case> {
        self.cases
            .get_mut(name)
            .ok_or_else(|| ExecutorError::CaseNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.cases.keys().map(|s| s.as_str()).collect()
    }

    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.values()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
