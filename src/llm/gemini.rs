//! Google Gemini 后端（generativelanguage v1beta）
//!
//! 系统提示词以一对合成轮次注入：user `[System instructions]\n...`，model 确认回复；
//! assistant 角色映射为 `model`。流式使用 `:streamGenerateContent?alt=sse`。

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::sse::data_events;
use crate::llm::{ChatBackend, ChatRequest, EventStream, HttpBase, LlmError, LlmResponse, Role, StreamEvent, Usage};

const SYSTEM_ACK: &str = "Understood. I will follow those instructions.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    fn usage(&self) -> Option<Usage> {
        self.usage_metadata
            .as_ref()
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
    }
}

pub struct GeminiBackend {
    http: HttpBase,
}

impl GeminiBackend {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            http: HttpBase::new("google", base_url, api_key),
        }
    }

    fn payload(request: &ChatRequest) -> Value {
        let mut contents = Vec::with_capacity(request.messages.len() + 2);
        if !request.system.is_empty() {
            contents.push(json!({
                "role": "user",
                "parts": [{ "text": format!("[System instructions]\n{}", request.system) }]
            }));
            contents.push(json!({ "role": "model", "parts": [{ "text": SYSTEM_ACK }] }));
        }
        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(json!({ "role": role, "parts": [{ "text": m.content }] }));
        }
        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            }
        })
    }

    fn request(&self, model: &str, method: &str, body: &Value) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = self.http.key()?;
        let url = self.http.url(&format!("models/{model}:{method}"));
        Ok(self.http.post(&url, body).header("x-goog-api-key", key))
    }
}

fn parse_stream_chunk(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let chunk: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| LlmError::invalid_response("google", format!("bad stream chunk: {e}")))?;
    let mut out = Vec::new();
    let text = chunk.text();
    if !text.is_empty() {
        out.push(StreamEvent::Text(text));
    }
    if let Some(usage) = chunk.usage() {
        out.push(StreamEvent::Usage(usage));
    }
    Ok(out)
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.http.provider
    }

    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let body = Self::payload(request);
        tracing::debug!(model = %request.model, messages = request.messages.len(), "Sending request to Gemini");
        let response: GenerateResponse = self
            .http
            .send_json(self.request(&request.model, "generateContent", &body)?)
            .await?;

        Ok(LlmResponse {
            content: response.text(),
            usage: response.usage(),
            model: response
                .model_version
                .clone()
                .unwrap_or_else(|| request.model.clone()),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<EventStream, LlmError> {
        let body = Self::payload(request);
        let builder = self
            .request(&request.model, "streamGenerateContent", &body)?
            .query(&[("alt", "sse")]);
        let response = self.http.send(builder).await?;

        let events = data_events("google", response).flat_map(|data| {
            let batch = match data.and_then(|d| parse_stream_chunk(&d)) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures_util::stream::iter(batch)
        });
        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn test_system_turn_pair_and_model_role() {
        let request = ChatRequest {
            model: "gemini-2.5-flash".into(),
            system: "Answer in Chinese.".into(),
            messages: vec![Message::user("黄芪"), Message::assistant("补气"), Message::user("当归")],
            temperature: 0.2,
            max_tokens: 512,
            tools: None,
        };
        let body = GeminiBackend::payload(&request);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 5);
        assert_eq!(contents[0]["parts"][0]["text"], "[System instructions]\nAnswer in Chinese.");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], SYSTEM_ACK);
        assert_eq!(contents[3]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_no_system_no_synthetic_turns() {
        let request = ChatRequest {
            model: "gemini-2.5-flash".into(),
            system: String::new(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: 16,
            tools: None,
        };
        assert_eq!(GeminiBackend::payload(&request)["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_stream_chunk_text_and_usage() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"人参"}],"role":"model"}}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3}}"#;
        assert_eq!(
            parse_stream_chunk(data).unwrap(),
            vec![StreamEvent::Text("人参".into()), StreamEvent::Usage(Usage::new(12, 3))]
        );
    }
}
