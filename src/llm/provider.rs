//! 服务商标识与协议族
//!
//! Provider 在构建客户端时一次性映射到 Protocol（OpenAI 兼容 / Anthropic / Gemini / Cohere），
//! 默认模型、默认 base_url、API Key 环境变量与温度覆盖都以数据表形式给出。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::llm::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    DeepSeek,
    Kimi,
    MiniMax,
    Qwen,
    Google,
    Mistral,
    Groq,
    Cohere,
}

/// 线协议族：同一族的服务商共用一个后端实现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenAiCompatible,
    Anthropic,
    Gemini,
    Cohere,
}

/// 部分服务商只接受固定温度（如 Kimi 某些模型仅允许 1.0）
pub const TEMPERATURE_OVERRIDES: &[(Provider, f32)] = &[(Provider::Kimi, 1.0)];

impl Provider {
    pub const ALL: [Provider; 10] = [
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::DeepSeek,
        Provider::Kimi,
        Provider::MiniMax,
        Provider::Qwen,
        Provider::Google,
        Provider::Mistral,
        Provider::Groq,
        Provider::Cohere,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Kimi => "kimi",
            Provider::MiniMax => "minimax",
            Provider::Qwen => "qwen",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Groq => "groq",
            Provider::Cohere => "cohere",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAi => "OpenAI",
            Provider::DeepSeek => "DeepSeek",
            Provider::Kimi => "Moonshot Kimi",
            Provider::MiniMax => "MiniMax",
            Provider::Qwen => "Qwen (DashScope)",
            Provider::Google => "Google (Gemini)",
            Provider::Mistral => "Mistral",
            Provider::Groq => "Groq",
            Provider::Cohere => "Cohere",
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Provider::Anthropic => Protocol::Anthropic,
            Provider::Google => Protocol::Gemini,
            Provider::Cohere => Protocol::Cohere,
            Provider::OpenAi
            | Provider::DeepSeek
            | Provider::Kimi
            | Provider::MiniMax
            | Provider::Qwen
            | Provider::Mistral
            | Provider::Groq => Protocol::OpenAiCompatible,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-sonnet-4-5-20250929",
            Provider::OpenAi => "gpt-4o",
            Provider::DeepSeek => "deepseek-v3.2",
            Provider::Kimi => "kimi-k2.5",
            Provider::MiniMax => "minimax-m2.5",
            Provider::Qwen => "qwen3-max",
            Provider::Google => "gemini-2.5-flash",
            Provider::Mistral => "mistral-large-latest",
            Provider::Groq => "llama-3.1-70b-versatile",
            Provider::Cohere => "command-r-plus",
        }
    }

    /// 默认 API 根地址；OpenAI 返回 None 表示使用 SDK 默认值
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::Anthropic => Some("https://api.anthropic.com/v1"),
            Provider::OpenAi => None,
            Provider::DeepSeek => Some("https://api.deepseek.com/v1"),
            Provider::Kimi => Some("https://api.moonshot.cn/v1"),
            Provider::MiniMax => Some("https://api.minimax.chat/v1"),
            Provider::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Provider::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Provider::Mistral => Some("https://api.mistral.ai/v1"),
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Cohere => Some("https://api.cohere.ai/v1"),
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Kimi => "MOONSHOT_API_KEY",
            Provider::MiniMax => "MINIMAX_API_KEY",
            Provider::Qwen => "DASHSCOPE_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Cohere => "COHERE_API_KEY",
        }
    }

    /// 应用温度覆盖表：命中则忽略调用方传入的温度
    pub fn effective_temperature(&self, requested: f32) -> f32 {
        TEMPERATURE_OVERRIDES
            .iter()
            .find(|(p, _)| p == self)
            .map(|(_, t)| *t)
            .unwrap_or(requested)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| LlmError::UnknownProvider(s.to_string()))
    }
}
