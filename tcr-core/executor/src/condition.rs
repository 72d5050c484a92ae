//! 运行条件求值
//!
//! 纯函数: 根据步骤序号、声明的条件、本次运行的历史以及可选的目标步骤，
//! 决定步骤是否执行；不执行时给出可读的原因。历史中不包含正在求值的步骤。

use serde::{Deserialize, Serialize};

use crate::{History, RunCondition, StepRunRecord};

/// 求值结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub should_run: bool,
    pub skip_reason: Option<String>,
}

impl Decision {
    pub fn run() -> Self {
        Self {
            should_run: true,
            skip_reason: None,
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_run: false,
            skip_reason: Some(reason.into()),
        }
    }
}

/// 求值步骤的运行条件
///
/// `step_index` 从 1 开始。无法识别的条件一律执行 (宽松回退)。
pub fn evaluate(
    step_index: usize,
    condition: &RunCondition,
    history: &History,
    target_step: Option<usize>,
) -> Decision {
    let previous = history.last();

    match condition {
        RunCondition::Always => Decision::run(),
        RunCondition::Skip => Decision::skip("Marked as Skip"),

        RunCondition::IfPreviousPassed => {
            if let Some(skip) = previous_executed(step_index, previous) {
                return skip;
            }
            match previous {
                Some(r) if r.is_pass() => Decision::run(),
                _ => Decision::skip("Previous step failed"),
            }
        }

        RunCondition::IfPreviousFailed => {
            if let Some(skip) = previous_executed(step_index, previous) {
                return skip;
            }
            match previous {
                Some(r) if r.is_failure() => Decision::run(),
                _ => Decision::skip("Previous step passed"),
            }
        }

        RunCondition::IfPreviousSkipped => {
            if step_index == 1 {
                return Decision::skip("No previous step to check");
            }
            match previous {
                Some(r) if r.is_skipped() => Decision::run(),
                _ => Decision::skip("Previous step was not skipped"),
            }
        }

        RunCondition::IfAllPreviousPassed => {
            if step_index == 1 {
                return Decision::run();
            }
            all_executed_passed(history, "Not all previous steps passed")
        }

        RunCondition::OnSuccessOnly => {
            if step_index == 1 {
                return Decision::run();
            }
            all_executed_passed(history, "Some previous steps failed")
        }

        RunCondition::IfAnyPreviousFailed => {
            if step_index == 1 {
                return Decision::skip("No previous steps to check");
            }
            let mut executed = history.executed().peekable();
            if executed.peek().is_none() {
                return Decision::skip("No previous steps were executed");
            }
            if executed.any(|r| r.is_failure()) {
                Decision::run()
            } else {
                Decision::skip("No previous steps failed")
            }
        }

        // 只看 ERROR；仅有 FAIL 不满足此条件
        RunCondition::OnErrorOnly => {
            if step_index == 1 {
                return Decision::skip("No previous steps to check");
            }
            if history.executed().any(|r| r.is_error()) {
                Decision::run()
            } else {
                Decision::skip("No previous errors detected")
            }
        }

        RunCondition::IfSpecificStepPassed => {
            specific_step(step_index, history, target_step, |record| {
                if record.is_pass() {
                    Decision::run()
                } else {
                    Decision::skip(format!("Step {} did not pass", record.index()))
                }
            })
        }

        RunCondition::IfSpecificStepFailed => {
            specific_step(step_index, history, target_step, |record| {
                if record.is_failure() {
                    Decision::run()
                } else {
                    Decision::skip(format!("Step {} did not fail", record.index()))
                }
            })
        }

        RunCondition::Unrecognized(_) => Decision::run(),
    }
}

/// "上一步" 类条件的公共前置检查；上一步存在且已执行时返回 None
fn previous_executed(step_index: usize, previous: Option<&StepRunRecord>) -> Option<Decision> {
    if step_index == 1 {
        return Some(Decision::skip("No previous step to check"));
    }
    match previous {
        None => Some(Decision::skip("Previous step had no result")),
        Some(r) if r.is_skipped() => Some(Decision::skip("Previous step was skipped")),
        Some(_) => None,
    }
}

fn all_executed_passed(history: &History, violated: &str) -> Decision {
    let mut executed = history.executed().peekable();
    if executed.peek().is_none() {
        return Decision::skip("No previous steps were executed");
    }
    if executed.all(|r| r.is_pass()) {
        Decision::run()
    } else {
        Decision::skip(violated)
    }
}

fn specific_step<F>(
    step_index: usize,
    history: &History,
    target_step: Option<usize>,
    check: F,
) -> Decision
where
    F: FnOnce(&StepRunRecord) -> Decision,
{
    let Some(target) = target_step else {
        return Decision::skip("No target step specified");
    };
    if target >= step_index {
        return Decision::skip(format!("Target step {} has not executed yet", target));
    }
    match history.find(target) {
        None => Decision::skip(format!("Step {} not found in history", target)),
        Some(record) if record.is_skipped() => {
            Decision::skip(format!("Step {} was skipped", target))
        }
        Some(record) => check(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepResult::{Error, Fail, Pass};
    use crate::{StepResult, StepRunRecord};

    fn history(entries: &[Option<StepResult>]) -> History {
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Some(result) => StepRunRecord::executed(i + 1, "step", *result),
                None => StepRunRecord::skipped(i + 1, "step"),
            })
            .collect()
    }

    fn reason(decision: &Decision) -> &str {
        decision.skip_reason.as_deref().unwrap_or("")
    }

    #[test]
    fn test_always_and_skip() {
        let empty = History::new();
        assert_eq!(evaluate(1, &RunCondition::Always, &empty, None), Decision::run());
        let d = evaluate(3, &RunCondition::Skip, &history(&[Some(Pass), Some(Pass)]), None);
        assert!(!d.should_run);
        assert_eq!(reason(&d), "Marked as Skip");
    }

    #[test]
    fn test_first_step_previous_conditions_never_run() {
        let empty = History::new();
        for condition in [
            RunCondition::IfPreviousPassed,
            RunCondition::IfPreviousFailed,
            RunCondition::IfPreviousSkipped,
            RunCondition::IfAnyPreviousFailed,
            RunCondition::OnErrorOnly,
        ] {
            let d = evaluate(1, &condition, &empty, None);
            assert!(!d.should_run, "{} should not run at step 1", condition);
            assert!(reason(&d).starts_with("No previous step"));
        }
        for condition in [
            RunCondition::IfSpecificStepPassed,
            RunCondition::IfSpecificStepFailed,
        ] {
            assert!(!evaluate(1, &condition, &empty, Some(1)).should_run);
            assert!(!evaluate(1, &condition, &empty, None).should_run);
        }
    }

    #[test]
    fn test_first_step_vacuous_conditions_run() {
        let empty = History::new();
        assert!(evaluate(1, &RunCondition::IfAllPreviousPassed, &empty, None).should_run);
        assert!(evaluate(1, &RunCondition::OnSuccessOnly, &empty, None).should_run);
    }

    #[test]
    fn test_if_previous_passed() {
        let d = evaluate(2, &RunCondition::IfPreviousPassed, &history(&[Some(Pass)]), None);
        assert!(d.should_run);

        let d = evaluate(2, &RunCondition::IfPreviousPassed, &history(&[Some(Fail)]), None);
        assert_eq!(reason(&d), "Previous step failed");

        let d = evaluate(2, &RunCondition::IfPreviousPassed, &history(&[Some(Error)]), None);
        assert_eq!(reason(&d), "Previous step failed");

        let d = evaluate(2, &RunCondition::IfPreviousPassed, &history(&[None]), None);
        assert_eq!(reason(&d), "Previous step was skipped");

        let d = evaluate(2, &RunCondition::IfPreviousPassed, &History::new(), None);
        assert_eq!(reason(&d), "Previous step had no result");
    }

    #[test]
    fn test_if_previous_failed() {
        assert!(evaluate(2, &RunCondition::IfPreviousFailed, &history(&[Some(Fail)]), None).should_run);
        assert!(evaluate(2, &RunCondition::IfPreviousFailed, &history(&[Some(Error)]), None).should_run);

        let d = evaluate(2, &RunCondition::IfPreviousFailed, &history(&[Some(Pass)]), None);
        assert_eq!(reason(&d), "Previous step passed");

        let d = evaluate(3, &RunCondition::IfPreviousFailed, &history(&[Some(Fail), None]), None);
        assert_eq!(reason(&d), "Previous step was skipped");
    }

    #[test]
    fn test_if_previous_skipped() {
        assert!(evaluate(3, &RunCondition::IfPreviousSkipped, &history(&[Some(Pass), None]), None).should_run);

        let d = evaluate(2, &RunCondition::IfPreviousSkipped, &history(&[Some(Fail)]), None);
        assert_eq!(reason(&d), "Previous step was not skipped");

        let d = evaluate(2, &RunCondition::IfPreviousSkipped, &History::new(), None);
        assert!(!d.should_run);
    }

    #[test]
    fn test_if_all_previous_passed() {
        let cond = RunCondition::IfAllPreviousPassed;
        assert!(evaluate(4, &cond, &history(&[Some(Pass), None, Some(Pass)]), None).should_run);

        let d = evaluate(3, &cond, &history(&[Some(Pass), Some(Fail)]), None);
        assert_eq!(reason(&d), "Not all previous steps passed");

        let d = evaluate(3, &cond, &history(&[None, None]), None);
        assert_eq!(reason(&d), "No previous steps were executed");
    }

    #[test]
    fn test_all_previous_passed_matches_success_only() {
        let histories = [
            history(&[Some(Pass)]),
            history(&[Some(Pass), None]),
            history(&[Some(Pass), Some(Fail)]),
            history(&[Some(Error), Some(Pass)]),
            history(&[None, None]),
            history(&[None, Some(Pass), Some(Pass)]),
        ];
        for h in histories.iter() {
            let index = h.len() + 1;
            let all = evaluate(index, &RunCondition::IfAllPreviousPassed, h, None);
            let success = evaluate(index, &RunCondition::OnSuccessOnly, h, None);
            assert_eq!(all.should_run, success.should_run);
        }
    }

    #[test]
    fn test_if_any_previous_failed() {
        let cond = RunCondition::IfAnyPreviousFailed;
        assert!(evaluate(3, &cond, &history(&[Some(Fail), Some(Pass)]), None).should_run);
        assert!(evaluate(3, &cond, &history(&[Some(Pass), Some(Error)]), None).should_run);

        let d = evaluate(3, &cond, &history(&[Some(Pass), Some(Pass)]), None);
        assert_eq!(reason(&d), "No previous steps failed");

        let d = evaluate(2, &cond, &history(&[None]), None);
        assert_eq!(reason(&d), "No previous steps were executed");
    }

    #[test]
    fn test_on_error_only_ignores_fail() {
        let cond = RunCondition::OnErrorOnly;
        let d = evaluate(3, &cond, &history(&[Some(Fail), Some(Fail)]), None);
        assert!(!d.should_run);
        assert_eq!(reason(&d), "No previous errors detected");

        assert!(evaluate(3, &cond, &history(&[Some(Pass), Some(Error)]), None).should_run);
        assert!(!evaluate(2, &cond, &history(&[None]), None).should_run);
    }

    #[test]
    fn test_specific_step_passed() {
        let cond = RunCondition::IfSpecificStepPassed;
        let h = history(&[Some(Pass), Some(Fail), None]);

        assert!(evaluate(4, &cond, &h, Some(1)).should_run);
        assert_eq!(reason(&evaluate(4, &cond, &h, Some(2))), "Step 2 did not pass");
        assert_eq!(reason(&evaluate(4, &cond, &h, Some(3))), "Step 3 was skipped");
        assert_eq!(reason(&evaluate(4, &cond, &h, None)), "No target step specified");
        assert_eq!(
            reason(&evaluate(4, &cond, &h, Some(4))),
            "Target step 4 has not executed yet"
        );
        assert_eq!(
            reason(&evaluate(4, &cond, &History::new(), Some(2))),
            "Step 2 not found in history"
        );
    }

    #[test]
    fn test_specific_step_forward_target_never_runs() {
        let cond = RunCondition::IfSpecificStepPassed;
        let h = history(&[Some(Pass), Some(Pass), Some(Pass)]);
        for target in 2..6 {
            assert!(!evaluate(2, &cond, &h, Some(target)).should_run);
        }
        let d = evaluate(1, &cond, &History::new(), Some(1));
        assert_eq!(reason(&d), "Target step 1 has not executed yet");
    }

    #[test]
    fn test_specific_step_failed() {
        let cond = RunCondition::IfSpecificStepFailed;
        assert!(evaluate(2, &cond, &history(&[Some(Error)]), Some(1)).should_run);
        assert!(evaluate(2, &cond, &history(&[Some(Fail)]), Some(1)).should_run);
        assert_eq!(
            reason(&evaluate(2, &cond, &history(&[Some(Pass)]), Some(1))),
            "Step 1 did not fail"
        );
    }

    #[test]
    fn test_unrecognized_condition_runs() {
        let cond = RunCondition::Unrecognized("Every Other Tuesday".to_string());
        assert!(evaluate(1, &cond, &History::new(), None).should_run);
        assert!(evaluate(5, &cond, &history(&[Some(Fail); 4]), None).should_run);
    }

    #[test]
    fn test_evaluate_is_repeatable() {
        let h = history(&[Some(Pass), None, Some(Error)]);
        for condition in RunCondition::ALL.iter() {
            let first = evaluate(4, condition, &h, Some(1));
            let second = evaluate(4, condition, &h, Some(1));
            assert_eq!(first, second);
        }
        assert_eq!(h.len(), 3);
    }
}
