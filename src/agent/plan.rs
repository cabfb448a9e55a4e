//! 计划与步骤结果
//!
//! Plan 由规划器生成后不再修改；执行器为每个 Step 产出一个 StepResult，顺序与输入一致。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 无工具步骤时的直接回答哨兵
pub const DIRECT_TOOL: &str = "llm_direct";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// 规划回复无法解析为 JSON，reasoning 中是模型原文
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub raw_response: bool,
}

impl Plan {
    /// 零步骤计划：直接由模型自身推理作答
    pub fn direct(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            steps: Vec::new(),
            raw_response: false,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 单个工具调用意图
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 仅供展示；缺省时按位置编号
    #[serde(
        default,
        deserialize_with = "lenient_step_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub step: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub purpose: String,
}

/// 模型常把编号写成 `"1"`；数字或数字字符串都接受，其余视为缺省
fn lenient_step_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

impl Step {
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            step: None,
            tool: tool.into(),
            parameters: match parameters {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            purpose: String::new(),
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// 步骤结果；output 仅在成功时存在，error 仅在失败时存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: u32,
    pub tool: String,
    #[serde(default)]
    pub purpose: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn success(step: u32, tool: &str, purpose: &str, output: Value) -> Self {
        Self {
            step,
            tool: tool.to_string(),
            purpose: purpose.to_string(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn error(step: u32, tool: &str, purpose: &str, error: impl Into<String>) -> Self {
        Self {
            step,
            tool: tool.to_string(),
            purpose: purpose.to_string(),
            status: StepStatus::Error,
            output: None,
            error: Some(error.into()),
        }
    }

    /// 直接回答哨兵：step 0，output 为计划推理原文
    pub fn direct(reasoning: &str) -> Self {
        Self::success(0, DIRECT_TOOL, "", Value::String(reasoning.to_string()))
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// 若为直接回答哨兵，返回其文本
    pub fn direct_answer(&self) -> Option<&str> {
        if self.tool == DIRECT_TOOL {
            self.output.as_ref().and_then(Value::as_str)
        } else {
            None
        }
    }
}
