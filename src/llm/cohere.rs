//! Cohere v1 /chat 后端
//!
//! 系统提示词与对话被展平为 `[role]\ncontent` 段落，作为单条 message 发送。
//! 该服务商不走流式：stream 退化为一次 chat，整段文本作为单个事件返回。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::llm::{ChatBackend, ChatRequest, EventStream, HttpBase, LlmError, LlmResponse, StreamEvent};
use crate::llm::Usage;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    text: String,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    billed_units: Option<BilledUnits>,
}

#[derive(Debug, Deserialize)]
struct BilledUnits {
    #[serde(default)]
    input_tokens: f64,
    #[serde(default)]
    output_tokens: f64,
}

pub struct CohereBackend {
    http: HttpBase,
}

impl CohereBackend {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            http: HttpBase::new("cohere", base_url, api_key),
        }
    }

    fn flatten(request: &ChatRequest) -> String {
        let mut parts = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            parts.push(format!("[system]\n{}", request.system));
        }
        parts.extend(
            request
                .messages
                .iter()
                .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content)),
        );
        parts.join("\n\n")
    }
}

#[async_trait]
impl ChatBackend for CohereBackend {
    fn name(&self) -> &str {
        &self.http.provider
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let key = self.http.key()?;
        let body = json!({
            "model": request.model,
            "message": Self::flatten(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let builder = self.http.post(&self.http.url("chat"), &body).bearer_auth(key);
        let response: ChatResponse = self.http.send_json(builder).await?;

        let usage = response
            .meta
            .and_then(|m| m.billed_units)
            .map(|b| Usage::new(b.input_tokens as u64, b.output_tokens as u64));
        Ok(LlmResponse {
            content: response.text,
            model: request.model.clone(),
            usage,
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let response = self.chat(request).await?;
        let mut events = vec![Ok(StreamEvent::Text(response.content))];
        if let Some(usage) = response.usage {
            events.push(Ok(StreamEvent::Usage(usage)));
        }
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}
