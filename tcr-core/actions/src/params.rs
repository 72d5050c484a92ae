//! 步骤参数读取
//!
//! 导出文件里的参数可能是字符串、数字或布尔值，这里统一转换。

use serde_json::Value;
use tcr_executor::StepDetails;

/// 读取文本参数，缺省为空串，两端空白被去除
pub fn text(details: &StepDetails, key: &str) -> String {
    match details.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// 读取可选文本参数，空串视为未设置
pub fn optional_text(details: &StepDetails, key: &str) -> Option<String> {
    Some(text(details, key)).filter(|s| !s.is_empty())
}

/// 读取布尔参数
pub fn flag(details: &StepDetails, key: &str, default: bool) -> bool {
    match details.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map_or(default, |n| n != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        _ => default,
    }
}

/// 读取非负整数参数 (秒、分钟等)
///
/// 缺省或空串返回 `default`；无法解析时返回 `None`。
pub fn number(details: &StepDetails, key: &str, default: Option<u64>) -> Option<u64> {
    match details.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) if s.trim().is_empty() => default,
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

/// 读取小数参数 (GB、MB 等)
///
/// 缺省、空串或无法解析时返回 `None`。
pub fn decimal(details: &StepDetails, key: &str) -> Option<f64> {
    match details.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 读取列表参数: JSON 数组或逗号分隔的字符串
pub fn list(details: &StepDetails, key: &str) -> Vec<String> {
    match details.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
