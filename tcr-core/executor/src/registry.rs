//! 动作注册表
//!
//! 步骤类型 -> 动作执行器。新的步骤类型只需注册执行器，无需改动用例执行器。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{ExecutorError, Result, StepDetails};

/// 动作执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// 预期是否满足
    pub passed: bool,

    /// 一行可读信息
    pub message: String,

    /// 原始输出 (命令输出、匹配的日志行等)
    pub output: String,
}

impl ActionOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            passed: true,
            output: message.clone(),
            message,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            passed: false,
            output: message.clone(),
            message,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// 动作执行器 trait
///
/// 预期内的失败返回 `Ok(passed = false)`；只有意外故障才返回 `Err`，
/// 用例执行器会把它记为 ERROR。
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn execute(&self, details: &StepDetails) -> Result<ActionOutcome>;
}

/// 动作注册表
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<String, Arc<dyn StepAction>>>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            actions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册步骤类型
    pub async fn register(&self, step_type: &str, action: Arc<dyn StepAction>) -> Result<()> {
        info!("注册步骤类型: {}", step_type);

        let mut actions = self.actions.write().await;

        if actions.contains_key(step_type) {
            return Err(ExecutorError::ActionAlreadyRegistered(step_type.to_string()));
        }

        actions.insert(step_type.to_string(), action);

        Ok(())
    }

    /// 注销步骤类型
    pub async fn unregister(&self, step_type: &str) -> Result<()> {
        info!("注销步骤类型: {}", step_type);

        let mut actions = self.actions.write().await;

        actions
            .remove(step_type)
            .ok_or_else(|| ExecutorError::ActionNotFound(step_type.to_string()))?;

        Ok(())
    }

    /// 获取执行器
    pub async fn get(&self, step_type: &str) -> Result<Arc<dyn StepAction>> {
        let actions = self.actions.read().await;

        actions
            .get(step_type)
            .cloned()
            .ok_or_else(|| ExecutorError::ActionNotFound(step_type.to_string()))
    }

    /// 列出所有已注册的步骤类型 (已排序)
    pub async fn list(&self) -> Vec<String> {
        let actions = self.actions.read().await;
        let mut types: Vec<String> = actions.keys().cloned().collect();
        types.sort();
        types
    }

    /// 检查步骤类型是否已注册
    pub async fn is_registered(&self, step_type: &str) -> bool {
        let actions = self.actions.read().await;
        actions.contains_key(step_type)
    }

    /// 解析并执行步骤
    ///
    /// 未注册的类型返回失败结果而不是错误。
    pub async fn execute(&self, step_type: &str, details: &StepDetails) -> Result<ActionOutcome> {
        let action = match self.get(step_type).await {
            Ok(action) => action,
            Err(_) => {
                warn!("未知的步骤类型: {}", step_type);
                return Ok(ActionOutcome::fail(format!(
                    "Unknown step type: {}",
                    step_type
                )));
            }
        };

        debug!("执行步骤类型: {}", step_type);
        action.execute(details).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl StepAction for Echo {
        async fn execute(&self, details: &StepDetails) -> Result<ActionOutcome> {
            let text = details
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(ActionOutcome::pass(text))
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = ActionRegistry::new();
        registry.register("Echo", Arc::new(Echo)).await.unwrap();
        assert!(registry.is_registered("Echo").await);

        let mut details = StepDetails::new();
        details.insert("text".to_string(), "hi".into());
        let outcome = registry.execute("Echo", &details).await.unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.message, "hi");
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let registry = ActionRegistry::new();
        registry.register("Echo", Arc::new(Echo)).await.unwrap();
        let result = registry.register("Echo", Arc::new(Echo)).await;
        assert!(matches!(result, Err(ExecutorError::ActionAlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let registry = ActionRegistry::new();
        let outcome = registry
            .execute("Teleport", &StepDetails::new())
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.message, "Unknown step type: Teleport");
    }

    #[tokio::test]
    async fn test_unregister_and_list() {
        let registry = ActionRegistry::new();
        registry.register("B", Arc::new(Echo)).await.unwrap();
        registry.register("A", Arc::new(Echo)).await.unwrap();
        assert_eq!(registry.list().await, vec!["A".to_string(), "B".to_string()]);

        registry.unregister("A").await.unwrap();
        assert!(registry.unregister("A").await.is_err());
        assert!(!registry.is_registered("A").await);
    }
}
