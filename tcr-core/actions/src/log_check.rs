//! 日志文件检查步骤
//!
//! 只考虑行首带可识别时间戳的日志行，按时间窗口、日志级别和关键字过滤。

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeDelta};
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tcr_executor::{ActionOutcome, StepAction, StepDetails};
use tracing::debug;

use crate::{params, ActionError, Result};

/// 行首时间戳格式，按顺序尝试
const TIMESTAMP_PATTERNS: &[(&str, &str)] = &[
    (
        r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}[,.]\d{3}",
        "%Y-%m-%d %H:%M:%S%.f",
    ),
    (
        r"^\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2}\.\d{3}",
        "%d.%m.%Y %H:%M:%S%.f",
    ),
    (r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}", "%Y-%m-%d %H:%M:%S"),
    (r"^\d{2}-\d{2}-\d{4} \d{2}:\d{2}:\d{2}", "%d-%m-%Y %H:%M:%S"),
    (r"^\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}", "%d/%m/%Y %H:%M:%S"),
    (r"^\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}", "%Y/%m/%d %H:%M:%S"),
    (r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}", "%Y-%m-%d %H:%M"),
];

/// 输出中保留的最后匹配行数
const TAIL_LINES: usize = 3;

/// 检查日志文件
///
/// 参数: `log_file_path`, `log_type` (整词匹配)，`search` (不区分大小写，
/// 斜杠归一化)，`duration` (分钟，0 表示不限)，`delay` (检查前等待秒数)，
/// `timestamp_format` (自定义时间戳格式，优先尝试)。
pub struct CheckLogFile {
    patterns: Vec<(Regex, &'static str)>,
}

impl CheckLogFile {
    pub fn new() -> Result<Self> {
        let patterns = TIMESTAMP_PATTERNS
            .iter()
            .map(|(pattern, format)| -> Result<(Regex, &'static str)> {
                Ok((Regex::new(pattern)?, *format))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// 解析行首时间戳
    fn parse_timestamp(&self, line: &str, custom_format: Option<&str>) -> Option<NaiveDateTime> {
        if let Some(format) = custom_format {
            if let Ok((time, _)) = NaiveDateTime::parse_and_remainder(line, format) {
                return Some(time);
            }
        }

        self.patterns.iter().find_map(|(pattern, format)| {
            let matched = pattern.find(line)?.as_str().replace(',', ".");
            NaiveDateTime::parse_from_str(&matched, format).ok()
        })
    }

    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let path = params::text(details, "log_file_path");
        let log_type = params::text(details, "log_type").to_lowercase();
        let search = normalize(&params::text(details, "search"));
        let custom_format = params::optional_text(details, "timestamp_format");
        let duration = params::number(details, "duration", Some(0)).ok_or_else(|| {
            ActionError::InvalidParameter(format!("duration: {}", params::text(details, "duration")))
        })?;
        let delay = params::number(details, "delay", Some(0)).ok_or_else(|| {
            ActionError::InvalidParameter(format!("delay: {}", params::text(details, "delay")))
        })?;

        let threshold = window_start(duration)?;

        if delay > 0 {
            debug!("日志检查前等待 {} 秒", delay);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        if path.is_empty() || !Path::new(&path).exists() {
            return Ok(ActionOutcome::fail(format!("Log file not found: {}", path)));
        }

        let log_type_pattern = if log_type.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"\b{}\b", regex::escape(&log_type)))?)
        };

        let bytes = tokio::fs::read(&path).await?;
        let content = String::from_utf8_lossy(&bytes);

        let matched: Vec<&str> = content
            .lines()
            .filter(|line| {
                let Some(time) = self.parse_timestamp(line, custom_format.as_deref()) else {
                    return false;
                };
                if threshold.is_some_and(|start| time < start) {
                    return false;
                }
                let lowered = line.to_lowercase();
                if let Some(pattern) = &log_type_pattern {
                    if !pattern.is_match(&lowered) {
                        return false;
                    }
                }
                search.is_empty() || normalize(line).contains(&search)
            })
            .collect();

        debug!("日志文件 {} 匹配 {} 行", path, matched.len());

        if matched.is_empty() {
            return Ok(ActionOutcome::fail(
                "No entries found that match the search parameters.",
            ));
        }

        let tail = matched[matched.len().saturating_sub(TAIL_LINES)..]
            .iter()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ActionOutcome::pass(format!(
            "Found {} matching log lines (last {} min). Last {}:",
            matched.len(),
            duration,
            TAIL_LINES
        ))
        .with_output(tail))
    }
}

/// 时间窗口起点；`duration` 为 0 时不限
fn window_start(duration: u64) -> Result<Option<NaiveDateTime>> {
    if duration == 0 {
        return Ok(None);
    }
    i64::try_from(duration)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .and_then(|window| Local::now().naive_local().checked_sub_signed(window))
        .map(Some)
        .ok_or_else(|| ActionError::InvalidParameter(format!("duration 超出范围: {}", duration)))
}

/// 小写化并统一路径分隔符
fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .replace('\\', "/")
        .replace("//", "/")
}

#[async_trait]
impl StepAction for CheckLogFile {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tcr_executor::ExecutorError;

    fn details(value: serde_json::Value) -> StepDetails {
        match value {
            serde_json::Value::Object(map) => map,
            _ => StepDetails::new(),
        }
    }

    fn stamp(minutes_ago: i64) -> String {
        (Local::now() - TimeDelta::minutes(minutes_ago))
            .format("%Y-%m-%d %H:%M:%S,%3f")
            .to_string()
    }

    fn write_log(dir: &Path) -> String {
        let path = dir.join("app.log");
        let lines = [
            format!("{} ERROR failed to open C:\\Data\\input.csv", stamp(120)),
            format!("{} INFO started", stamp(5)),
            "no timestamp ERROR C:\\Data\\input.csv".to_string(),
            format!("{} ERROR failed to open C:\\Data\\input.csv", stamp(2)),
            format!("{} ERRORS summary C:/data/input.csv", stamp(1)),
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let check = CheckLogFile::new().unwrap();
        let cases = [
            "2024-01-02 03:04:05,123 x",
            "02.01.2024 03:04:05.123 x",
            "2024-01-02 03:04:05 x",
            "02-01-2024 03:04:05 x",
            "02/01/2024 03:04:05 x",
            "2024/01/02 03:04:05 x",
            "2024-01-02 03:04 x",
        ];
        for line in cases {
            let time = check.parse_timestamp(line, None);
            assert!(time.is_some(), "failed to parse {}", line);
        }
        assert!(check.parse_timestamp("hello 2024-01-02", None).is_none());

        let custom = check.parse_timestamp("[02 Jan 2024 03:04:05] x", Some("[%d %b %Y %H:%M:%S]"));
        assert!(custom.is_some());
    }

    #[tokio::test]
    async fn test_log_check_window_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path());
        let check = CheckLogFile::new().unwrap();

        let outcome = check
            .execute(&details(json!({
                "log_file_path": path,
                "log_type": "ERROR",
                "search": "c:\\data\\input.csv",
                "duration": "30",
            })))
            .await
            .unwrap();

        // 120 分钟前的行被时间窗口排除，ERRORS 不是整词匹配
        assert!(outcome.passed, "{}", outcome.message);
        assert!(outcome.message.starts_with("Found 1 matching log lines (last 30 min)"));
        assert_eq!(outcome.output.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_log_check_without_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path());
        let check = CheckLogFile::new().unwrap();

        let outcome = check
            .execute(&details(json!({
                "log_file_path": path,
                "search": "input.csv",
            })))
            .await
            .unwrap();

        assert!(outcome.passed);
        assert!(outcome.message.starts_with("Found 3 matching log lines"));
    }

    #[tokio::test]
    async fn test_log_check_no_match_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path());
        let check = CheckLogFile::new().unwrap();

        let outcome = check
            .execute(&details(json!({"log_file_path": path, "log_type": "warning"})))
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(
            outcome.message,
            "No entries found that match the search parameters."
        );

        let outcome = check
            .execute(&details(json!({"log_file_path": "/no/such.log"})))
            .await
            .unwrap();
        assert_eq!(outcome.message, "Log file not found: /no/such.log");
    }

    #[tokio::test]
    async fn test_log_check_rejects_oversized_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path());
        let check = CheckLogFile::new().unwrap();

        let result = check
            .execute(&details(json!({
                "log_file_path": path,
                "duration": "999999999999999999",
            })))
            .await;

        match result {
            Err(ExecutorError::StepExecutionFailed(message)) => {
                assert!(message.contains("duration"), "{}", message)
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.message)),
        }
        assert!(window_start(0).unwrap().is_none());
        assert!(window_start(30).unwrap().is_some());
    }
}
