//! Hosted LLM access.
//!
//! Everything that asks a model for text goes through [`LlmAdapter`]:
//! post summarization in the scraper, and the assessment preview and
//! business analysis endpoints in the server.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Text deltas from a streaming completion.
pub type TextStream = BoxStream<'static, LlmResult<String>>;

#[async_trait]
pub trait LlmAdapter: Send + Sync {
    fn adapter_name(&self) -> String;

    /// Send a prompt and return the full text response.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> LlmResult<String>;

    /// Stream a completion as text deltas. Adapters without native
    /// streaming yield the whole completion as a single chunk.
    async fn complete_stream(&self, prompt: &str, max_tokens: u32) -> LlmResult<TextStream> {
        let text = self.complete(prompt, max_tokens).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Pull the first JSON object out of a model response that may wrap it in
/// prose or a fenced code block.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a typed value out of a model response.
pub fn parse_json_response<T: for<'de> Deserialize<'de>>(text: &str) -> LlmResult<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| LlmError::ParseError("no JSON object in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| LlmError::ParseError(e.to_string()))
}

/// Anthropic Messages API adapter.
pub struct ClaudeAdapter {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ClaudeAdapter {
    pub fn new(api_key: String, model: String) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::NotConfigured(e.to_string()))?;
        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    async fn send(&self, prompt: &str, max_tokens: u32, stream: bool) -> LlmResult<reqwest::Response> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens,
            stream,
            messages: vec![ClaudeMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(LlmError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ClaudeErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::ApiError { status, message });
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeApiError,
}

/// One `data:` payload of the streaming API.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    error: Option<ClaudeApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

/// Incremental parser for the server-sent event body of a streaming
/// response. Feed it raw bytes; it hands back completed text deltas.
/// Bytes are decoded one complete line at a time.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<LlmResult<String>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let event: StreamEvent = match serde_json::from_str(data.trim()) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Skipping unparseable stream line: {}", e);
                    continue;
                }
            };
            match event.event_type.as_str() {
                "content_block_delta" => {
                    if let Some(text) = event.delta.and_then(|d| d.text) {
                        out.push(Ok(text));
                    }
                }
                "message_stop" => self.finished = true,
                "error" => {
                    let message = event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "stream error".to_string());
                    out.push(Err(LlmError::ApiError {
                        status: 500,
                        message,
                    }));
                    self.finished = true;
                }
                _ => {}
            }
        }

        out
    }

    pub(crate) fn finished(&self) -> bool {
        self.finished
    }
}

#[async_trait]
impl LlmAdapter for ClaudeAdapter {
    fn adapter_name(&self) -> String {
        format!("claude ({})", self.model)
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> LlmResult<String> {
        let response = self.send(prompt, max_tokens, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let response: ClaudeResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::ParseError(e.to_string()))?;

        response
            .content
            .into_iter()
            .find_map(|c| (c.content_type == "text").then_some(c.text).flatten())
            .ok_or_else(|| LlmError::ParseError("No text content in response".to_string()))
    }

    async fn complete_stream(&self, prompt: &str, max_tokens: u32) -> LlmResult<TextStream> {
        let response = self.send(prompt, max_tokens, true).await?;
        let bytes = response.bytes_stream().boxed();

        let state = (bytes, SseDecoder::default(), VecDeque::<LlmResult<String>>::new());
        let deltas = stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, decoder, pending)));
                }
                if decoder.finished() {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        warn!("LLM stream interrupted: {}", e);
                        return Some((
                            Err(LlmError::RequestFailed(e.to_string())),
                            (bytes, SseDecoder { finished: true, ..decoder }, pending),
                        ));
                    }
                    None => return None,
                }
            }
        });

        Ok(deltas.boxed())
    }
}

/// Deterministic adapter for development and tests.
pub struct MockLlmAdapter {
    name: String,
    response: Option<String>,
    response_delay_ms: u64,
}

impl MockLlmAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Some("{}".to_string()),
            response_delay_ms: 0,
        }
    }

    /// Always answer with `response`.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    /// Every call fails, as if the upstream API were down.
    pub fn failing(mut self) -> Self {
        self.response = None;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("mock ({})", self.name)
    }

    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> LlmResult<String> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
        self.response.clone().ok_or_else(|| LlmError::ApiError {
            status: 503,
            message: "mock adapter configured to fail".to_string(),
        })
    }

    async fn complete_stream(&self, prompt: &str, max_tokens: u32) -> LlmResult<TextStream> {
        let text = self.complete(prompt, max_tokens).await?;
        // Split on spaces so consumers see more than one delta.
        let chunks: Vec<LlmResult<String>> = text
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// Build an adapter from `provider` ("claude" or "mock").
pub fn create_adapter(
    provider: &str,
    api_key: Option<String>,
    model: Option<String>,
) -> LlmResult<Box<dyn LlmAdapter>> {
    let adapter: Box<dyn LlmAdapter> = match provider {
        "mock" => Box::new(MockLlmAdapter::new("default")),
        "claude" => {
            let api_key = api_key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;
            let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
            Box::new(ClaudeAdapter::new(api_key, model)?)
        }
        other => {
            return Err(LlmError::NotConfigured(format!(
                "Unknown LLM provider: {}",
                other
            )))
        }
    };
    info!("Using LLM adapter: {}", adapter.adapter_name());
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_found_inside_prose() {
        let text = "Sure! Here you go:\n```json\n{\"summary\": \"ok\"}\n```";
        assert_eq!(extract_json_object(text), Some("{\"summary\": \"ok\"}"));
        assert_eq!(extract_json_object("no braces"), None);
    }

    #[test]
    fn sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        let first = decoder.push(b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel");
        assert!(first.is_empty());

        let second = decoder.push(b"lo\"}}\n\ndata: {\"type\":\"message_stop\"}\n");
        let texts: Vec<String> = second.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hello".to_string()]);
        assert!(decoder.finished());
    }

    #[test]
    fn sse_decoder_keeps_multibyte_text_split_across_chunks() {
        let line = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"café\"}}\n";
        let bytes = line.as_bytes();
        // 0xC3 is the first byte of "é"
        let cut = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        let texts: Vec<String> = decoder
            .push(&bytes[cut..])
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(texts, vec!["café".to_string()]);
    }

    #[tokio::test]
    async fn mock_stream_reassembles_to_full_text() {
        let adapter = MockLlmAdapter::new("test").with_response("three small words");
        let chunks: Vec<String> = adapter
            .complete_stream("prompt", 100)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), "three small words");
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let adapter = MockLlmAdapter::new("test").failing();
        assert!(adapter.complete("prompt", 10).await.is_err());
    }

    #[test]
    fn claude_requires_key() {
        assert!(matches!(
            create_adapter("claude", None, None),
            Err(LlmError::NotConfigured(_))
        ));
        assert!(create_adapter("mock", None, None).is_ok());
    }
}
