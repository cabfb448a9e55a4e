//! Anthropic Messages API 后端
//!
//! - POST `{base}/messages`，头部 `x-api-key` 与 `anthropic-version: 2023-06-01`
//! - 系统提示词走独立的 `system` 字段，响应文本为所有 text 块以换行拼接
//! - 流式：message_start 携带输入 token，content_block_delta 携带文本，message_delta 携带输出 token

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::sse::data_events;
use crate::llm::{ChatBackend, ChatRequest, EventStream, HttpBase, LlmError, LlmResponse, StreamEvent, Usage};

pub const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "is_blank")]
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Vec<Value>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicBackend {
    http: HttpBase,
}

impl AnthropicBackend {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            http: HttpBase::new("anthropic", base_url, api_key),
        }
    }

    fn build<'a>(&self, request: &'a ChatRequest, stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            tools: request.tools.as_ref(),
            stream,
        }
    }

    fn request(&self, body: &MessagesRequest<'_>) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = self.http.key()?;
        Ok(self
            .http
            .post(&self.http.url("messages"), body)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION))
    }
}

/// 单个 SSE data 负载 → 0..n 个事件
fn parse_stream_event(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let event: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::invalid_response("anthropic", format!("bad stream event: {e}")))?;
    let mut out = Vec::new();
    match event["type"].as_str().unwrap_or_default() {
        "message_start" => {
            let usage = &event["message"]["usage"];
            out.push(StreamEvent::Usage(Usage::new(
                usage["input_tokens"].as_u64().unwrap_or(0),
                usage["output_tokens"].as_u64().unwrap_or(0),
            )));
        }
        "content_block_delta" => {
            if event["delta"]["type"] == "text_delta" {
                if let Some(text) = event["delta"]["text"].as_str() {
                    out.push(StreamEvent::Text(text.to_string()));
                }
            }
        }
        "message_delta" => {
            if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                out.push(StreamEvent::Usage(Usage::new(
                    event["usage"]["input_tokens"].as_u64().unwrap_or(0),
                    output,
                )));
            }
        }
        "error" => {
            let message = event["error"]["message"]
                .as_str()
                .unwrap_or("unknown stream error");
            let kind = event["error"]["type"].as_str().unwrap_or("error");
            return Err(LlmError::classify("anthropic", format!("{kind}: {message}")));
        }
        _ => {}
    }
    Ok(out)
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.http.provider
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let body = self.build(request, false);
        let response: MessagesResponse = self.http.send_json(self.request(&body)?).await?;

        let content = response
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LlmResponse {
            content,
            model: response.model.unwrap_or_else(|| request.model.clone()),
            usage: response
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let body = self.build(request, true);
        let response = self.http.send(self.request(&body)?).await?;

        let events = data_events("anthropic", response).flat_map(|data| {
            let batch = match data.and_then(|d| parse_stream_event(&d)) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures_util::stream::iter(batch)
        });
        Ok(Box::pin(events))
    }
}
