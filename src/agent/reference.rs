//! `$stepN.path` 参数引用解析
//!
//! 形如 `$step2.output.targets` 的字符串参数指向第 N 个（从 1 开始）已完成步骤的结果，
//! 沿点分路径逐级按键取值。只能引用已产生的结果；越界、路径不可达或格式不符时
//! 原样保留引用字符串，交由工具自身的参数校验报错。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::agent::plan::StepResult;

static REFERENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn reference_re() -> Option<&'static Regex> {
    REFERENCE_RE
        .get_or_init(|| Regex::new(r"^\$step(\d+)(?:\.(.*))?$").ok())
        .as_ref()
}

/// 解析引用：返回 (从 0 开始的结果下标, 路径片段)
fn parse_reference(text: &str) -> Option<(usize, Vec<&str>)> {
    let caps = reference_re()?.captures(text)?;
    let index = caps.get(1)?.as_str().parse::<usize>().ok()?.checked_sub(1)?;
    let path = caps
        .get(2)
        .map(|m| m.as_str().split('.').collect())
        .unwrap_or_default();
    Some((index, path))
}

fn walk<'a>(mut node: &'a Value, path: &[&str]) -> Option<&'a Value> {
    for key in path {
        node = node.as_object()?.get(*key)?;
    }
    Some(node)
}

/// 解析单个引用字符串；失败时返回 None
pub fn resolve_reference(text: &str, previous: &[StepResult]) -> Option<Value> {
    let (index, path) = parse_reference(text)?;
    let result = serde_json::to_value(previous.get(index)?).ok()?;
    if let Some(found) = walk(&result, &path) {
        return Some(found.clone());
    }
    // `$step1.targets` 这类省略 output 的写法，从 output 开始再走一次
    let first_is_field = path
        .first()
        .is_some_and(|k| result.as_object().is_some_and(|o| o.contains_key(*k)));
    if first_is_field {
        return None;
    }
    walk(result.get("output")?, &path).cloned()
}

/// 解析一个参数值：只处理顶层字符串引用，其余原样返回
pub fn resolve_value(value: &Value, previous: &[StepResult]) -> Value {
    match value {
        Value::String(text) if text.starts_with("$step") => {
            resolve_reference(text, previous).unwrap_or_else(|| {
                tracing::debug!(reference = %text, "unresolved step reference passed through");
                value.clone()
            })
        }
        _ => value.clone(),
    }
}

pub fn resolve_params(parameters: &Map<String, Value>, previous: &[StepResult]) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, previous)))
        .collect()
}
