//! LLM 后端抽象
//!
//! 每个协议族实现 ChatBackend：chat（非流式）与 stream（文本增量 + 用量快照事件）。
//! 重试、温度覆盖与用量记录由上层 LlmClient 统一处理，后端只负责线协议。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmError, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 对话消息；系统提示词单独通过 ChatRequest::system 传入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    /// 已应用服务商温度覆盖后的值
    pub temperature: f32,
    pub max_tokens: u32,
    /// 透传给支持工具定义的服务商（Anthropic / OpenAI 兼容）
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

/// 流式事件：文本增量或用量快照（同一流内可能出现多次，按字段取最大值合并）
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Usage(Usage),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 服务商标识，用于日志与错误信息
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError>;

    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError>;
}
