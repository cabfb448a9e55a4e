//! Server-Sent Events 解码：按行缓冲，取出 `data:` 负载
//!
//! 跨 chunk 的半行留在缓冲区；空行、注释行与 `[DONE]` 均被跳过。

use futures_util::{stream, Stream, StreamExt};

use crate::llm::LlmError;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段字节，返回本次可解析出的所有 data 负载
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(data) = parse_data_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// 流结束时处理缓冲区中无换行结尾的最后一行
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        parse_data_line(&rest)
    }
}

fn parse_data_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

/// 将 HTTP 响应体转为 data 负载流
pub fn data_events(
    provider: &str,
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static {
    let provider = provider.to_string();
    let body = Box::pin(response.bytes_stream());
    let state = (body, SseDecoder::new(), Vec::<String>::new(), false);

    stream::unfold(state, move |(mut body, mut decoder, mut pending, mut done)| {
        let provider = provider.clone();
        async move {
            loop {
                if !pending.is_empty() {
                    let next = pending.remove(0);
                    return Some((Ok(next), (body, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(bytes)) => pending = decoder.push(&bytes),
                    Some(Err(e)) => {
                        done = true;
                        return Some((
                            Err(LlmError::from_reqwest(&provider, e)),
                            (body, decoder, pending, done),
                        ));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        }
    })
}
