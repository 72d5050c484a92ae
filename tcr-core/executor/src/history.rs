//! 步骤运行记录与本次运行历史

use serde::{Deserialize, Serialize};

use crate::StepResult;

/// 单个步骤的运行记录，每次步骤尝试追加一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRunRecord {
    index: usize,
    name: String,
    result: Option<StepResult>,
    skipped: bool,
}

impl StepRunRecord {
    /// 已执行步骤的记录
    pub fn executed(index: usize, name: &str, result: StepResult) -> Self {
        Self {
            index,
            name: name.to_string(),
            result: Some(result),
            skipped: false,
        }
    }

    /// 因条件不满足而跳过的记录
    pub fn skipped(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            result: None,
            skipped: true,
        }
    }

    /// 1 起始序号
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> Option<StepResult> {
        self.result
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn is_pass(&self) -> bool {
        self.result == Some(StepResult::Pass)
    }

    /// FAIL 或 ERROR
    pub fn is_failure(&self) -> bool {
        self.result.is_some_and(|r| r.is_failure())
    }

    pub fn is_error(&self) -> bool {
        self.result == Some(StepResult::Error)
    }
}

/// 历史统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub passed: usize,
    /// FAIL 与 ERROR 合计
    pub failed: usize,
}

/// 一次用例运行内的步骤历史
///
/// 只追加，不修改；每次运行从空历史开始，仅由该运行持有。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    records: Vec<StepRunRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加记录，序号必须严格递增
    pub fn push(&mut self, record: StepRunRecord) {
        debug_assert!(
            self.records
                .last()
                .map_or(true, |last| last.index < record.index),
            "step records must be appended in step order"
        );
        self.records.push(record);
    }

    /// 上一个步骤的记录
    pub fn last(&self) -> Option<&StepRunRecord> {
        self.records.last()
    }

    /// 按序号查找记录
    pub fn find(&self, index: usize) -> Option<&StepRunRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    /// 已执行 (未跳过) 的记录
    pub fn executed(&self) -> impl Iterator<Item = &StepRunRecord> {
        self.records.iter().filter(|r| !r.skipped)
    }

    pub fn records(&self) -> &[StepRunRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> HistorySummary {
        let mut summary = HistorySummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            if record.skipped {
                summary.skipped += 1;
                continue;
            }
            summary.executed += 1;
            if record.is_pass() {
                summary.passed += 1;
            } else if record.is_failure() {
                summary.failed += 1;
            }
        }
        summary
    }
}

impl FromIterator<StepRunRecord> for History {
    fn from_iter<I: IntoIterator<Item = StepRunRecord>>(iter: I) -> Self {
        let mut history = History::new();
        for record in iter {
            history.push(record);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_constructors() {
        let record = StepRunRecord::executed(1, "copy", StepResult::Error);
        assert!(!record.is_skipped());
        assert!(record.is_failure());
        assert!(record.is_error());

        let record = StepRunRecord::skipped(2, "check");
        assert!(record.is_skipped());
        assert_eq!(record.result(), None);
        assert!(!record.is_failure());
    }

    #[test]
    fn test_history_summary() {
        let history: History = vec![
            StepRunRecord::executed(1, "a", StepResult::Pass),
            StepRunRecord::skipped(2, "b"),
            StepRunRecord::executed(3, "c", StepResult::Fail),
            StepRunRecord::executed(4, "d", StepResult::Error),
        ]
        .into_iter()
        .collect();

        let summary = history.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn test_history_lookup() {
        let history: History = vec![
            StepRunRecord::executed(1, "a", StepResult::Pass),
            StepRunRecord::skipped(2, "b"),
        ]
        .into_iter()
        .collect();

        assert_eq!(history.last().map(|r| r.index()), Some(2));
        assert_eq!(history.find(1).map(|r| r.name()), Some("a"));
        assert!(history.find(3).is_none());
        assert_eq!(history.executed().count(), 1);
    }

    #[test]
    #[should_panic(expected = "step order")]
    #[cfg(debug_assertions)]
    fn test_history_rejects_out_of_order() {
        let mut history = History::new();
        history.push(StepRunRecord::executed(2, "b", StepResult::Pass));
        history.push(StepRunRecord::executed(1, "a", StepResult::Pass));
    }
}
