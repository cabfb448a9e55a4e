//! LLM 错误类型与文本分类
//!
//! 重试策略与调用方的「凭据修复」都按错误文本匹配标记词判断：
//! 因此每个变体的 Display 都保留上游返回的原始错误信息。

use thiserror::Error;

/// 可重试（瞬时）错误的标记词，大小写不敏感
pub const TRANSIENT_MARKERS: &[&str] = &[
    "rate_limit",
    "rate limit",
    "429",
    "overloaded",
    "529",
    "500",
    "502",
    "503",
    "connection",
    "timeout",
];

/// 认证失败的标记词
pub const AUTH_MARKERS: &[&str] = &[
    "authentication",
    "401",
    "unauthorized",
    "invalid api key",
    "invalid x-api-key",
    "incorrect api key",
    "api key not valid",
    "invalid_api_key",
];

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 网络 / 传输层错误（连接失败、超时）
    #[error("Connection error ({provider}): {message}")]
    Network { provider: String, message: String },

    #[error("Authentication failed ({provider}): {message}")]
    Authentication { provider: String, message: String },

    /// 服务端返回非 2xx
    #[error("API error {status} ({provider}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// SDK / 服务商返回的其它错误（无 HTTP 状态码）
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid response ({provider}): {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Missing API key for provider '{0}' (authentication required)")]
    MissingApiKey(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl LlmError {
    pub fn network(provider: &str, err: impl std::fmt::Display) -> Self {
        LlmError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// 按 HTTP 状态码归类：401/403 为认证错误，其余为 Api
    pub fn from_status(provider: &str, status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        if status == 401 || status == 403 {
            LlmError::Authentication {
                provider: provider.to_string(),
                message: format!("{status}: {message}"),
            }
        } else {
            LlmError::Api {
                provider: provider.to_string(),
                status,
                message,
            }
        }
    }

    /// reqwest 错误：超时 / 连接失败为 Network，解析失败为 InvalidResponse
    ///
    /// 读响应体超时也会带 decode 标记，因此先判断超时。
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return LlmError::network(provider, format!("timeout: {err}"));
        }
        if let Some(status) = err.status() {
            return LlmError::from_status(provider, status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return LlmError::invalid_response(provider, err.to_string());
        }
        LlmError::network(provider, err)
    }

    /// 文本分类：SDK 错误只能拿到字符串时使用
    pub fn classify(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if contains_any(&message, AUTH_MARKERS) {
            LlmError::Authentication {
                provider: provider.to_string(),
                message,
            }
        } else {
            LlmError::Provider {
                provider: provider.to_string(),
                message,
            }
        }
    }

    /// 上游返回的原始信息（不含服务商名与请求 URL 之外的包装）
    fn upstream_message(&self) -> &str {
        match self {
            LlmError::Network { message, .. }
            | LlmError::Authentication { message, .. }
            | LlmError::Api { message, .. }
            | LlmError::Provider { message, .. }
            | LlmError::InvalidResponse { message, .. } => message,
            LlmError::MissingApiKey(_) | LlmError::UnknownProvider(_) => "",
        }
    }

    /// 传输层错误一律可重试；Api 按状态码判断，SDK 错误按上游文本匹配标记词。
    /// 网络错误文本里带有请求 URL，端口号不参与匹配。
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network { .. } => true,
            LlmError::Api { status, message, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
                    || (*status >= 500 && is_transient_message(message))
            }
            LlmError::Provider { message, .. } => is_transient_message(message),
            _ => false,
        }
    }

    pub fn is_authentication(&self) -> bool {
        match self {
            LlmError::Authentication { .. } | LlmError::MissingApiKey(_) => true,
            LlmError::Network { .. } => false,
            LlmError::Api { status, .. } if *status >= 500 => false,
            other => contains_any(other.upstream_message(), AUTH_MARKERS),
        }
    }
}

pub fn is_transient_message(text: &str) -> bool {
    contains_any(text, TRANSIENT_MARKERS)
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::from_status("openai", 429, "Too Many Requests").is_transient());
        assert!(LlmError::from_status("anthropic", 529, "Overloaded").is_transient());
        assert!(LlmError::network("google", "connection reset by peer").is_transient());
        assert!(!LlmError::from_status("openai", 400, "bad request: unknown model").is_transient());
    }

    #[test]
    fn test_authentication_classification() {
        let err = LlmError::from_status("anthropic", 401, "invalid x-api-key");
        assert!(matches!(err, LlmError::Authentication { .. }));
        assert!(err.is_authentication());
        assert!(!err.is_transient());

        let err = LlmError::classify("openai", "Incorrect API key provided: sk-***");
        assert!(err.is_authentication());

        assert!(LlmError::MissingApiKey("google".into()).is_authentication());
        assert!(!LlmError::classify("openai", "model not found").is_authentication());
    }

    #[test]
    fn test_url_digits_do_not_flip_classification() {
        let refused = LlmError::network(
            "deepseek",
            "error sending request for url (http://127.0.0.1:35035/v1/chat/completions)",
        );
        assert!(refused.is_transient());
        assert!(!refused.is_authentication());

        let bad_request = LlmError::Api {
            provider: "openai".into(),
            status: 400,
            message: "unknown model for http://proxy:5030/v1".into(),
        };
        assert!(!bad_request.is_transient());

        let auth_port = LlmError::network("qwen", "connect to http://10.0.0.1:4010 refused");
        assert!(!auth_port.is_authentication());
    }

    #[test]
    fn test_display_preserves_original_text() {
        let err = LlmError::from_status("cohere", 503, "service unavailable, retry later");
        assert!(err.to_string().contains("service unavailable, retry later"));
    }
}
