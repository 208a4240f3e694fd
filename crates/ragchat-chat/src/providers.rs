//! LLM provider clients.
//!
//! Dispatch is on the resolved provider's wire format: OpenAI, OpenRouter, OpenWebUI,
//! Ollama, Perplexity and Groq speak the chat-completions format; Anthropic uses the
//! messages API. Dropping a returned future or stream drops the underlying request.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use ragchat_core::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error};

use crate::config::ResolvedLlmConfig;
use crate::sse::{data_payload, SseLineBuffer};
use crate::types::{ChatMessage, LlmProvider, WireFormat};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed fragment, end marker or failure.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: Option<usize> },
    Error(String),
}

/// One complete, non-streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tokens_used: Option<usize>,
}

/// Invokes an LLM for a resolved configuration.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot completion.
    async fn complete(&self, config: &ResolvedLlmConfig, messages: &[ChatMessage])
        -> Result<Completion>;

    /// Lazy fragment stream, finished by `Done` or `Error`. Not restartable.
    fn stream_complete(&self, config: &ResolvedLlmConfig, messages: Vec<ChatMessage>)
        -> BoxedStream;
}

/// [`LlmClient`] over HTTP.
#[derive(Clone, Default)]
pub struct HttpLlmClient {
    client: Client,
}

impl HttpLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn request(
        &self,
        config: &ResolvedLlmConfig,
        messages: &[ChatMessage],
        stream: bool,
    ) -> RequestBuilder {
        let url = config.completions_url();
        debug!("Calling {} ({}) with model {}", url, config.provider, config.model);

        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        match config.provider.wire_format() {
            WireFormat::OpenAiCompatible => {
                let mut builder = builder.json(&openai_body(config, messages, stream));
                if let Some(key) = &config.api_key {
                    builder = builder.header("Authorization", format!("Bearer {}", key));
                }
                if config.provider == LlmProvider::OpenRouter {
                    builder = builder
                        .header("HTTP-Referer", "http://localhost")
                        .header("X-Title", "ragchat");
                }
                builder
            }
            WireFormat::Anthropic => builder
                .header("x-api-key", config.api_key.as_deref().unwrap_or_default())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&anthropic_body(config, messages, stream)),
        }
    }
}

fn openai_body(config: &ResolvedLlmConfig, messages: &[ChatMessage], stream: bool) -> Value {
    let msgs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();
    json!({
        "model": config.model,
        "messages": msgs,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": stream,
    })
}

fn anthropic_body(config: &ResolvedLlmConfig, messages: &[ChatMessage], stream: bool) -> Value {
    // System messages go in a separate field
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": config.model,
        "messages": conv,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": stream,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        config: &ResolvedLlmConfig,
        messages: &[ChatMessage],
    ) -> Result<Completion> {
        let response = self
            .request(config, messages, false)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("API error {}: {}", status, body)));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Malformed completion: {}", e)))?;

        match config.provider.wire_format() {
            WireFormat::OpenAiCompatible => {
                let content = parsed["choices"][0]["message"]["content"]
                    .as_str()
                    .ok_or_else(|| Error::Provider("Completion has no message content".into()))?;
                Ok(Completion {
                    content: content.to_string(),
                    tokens_used: parsed["usage"]["total_tokens"].as_u64().map(|n| n as usize),
                })
            }
            WireFormat::Anthropic => {
                let blocks = parsed["content"]
                    .as_array()
                    .ok_or_else(|| Error::Provider("Completion has no content blocks".into()))?;
                let content: String = blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect();
                let usage = &parsed["usage"];
                let tokens_used = match (usage["input_tokens"].as_u64(), usage["output_tokens"].as_u64()) {
                    (None, None) => None,
                    (i, o) => Some((i.unwrap_or(0) + o.unwrap_or(0)) as usize),
                };
                Ok(Completion {
                    content,
                    tokens_used,
                })
            }
        }
    }

    fn stream_complete(
        &self,
        config: &ResolvedLlmConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxedStream {
        let request = self.request(config, &messages, true);
        match config.provider.wire_format() {
            WireFormat::OpenAiCompatible => Box::pin(sse_stream(request, parse_openai_event)),
            WireFormat::Anthropic => Box::pin(sse_stream(request, parse_anthropic_event)),
        }
    }
}

/// Outcome of parsing one SSE `data:` payload.
#[derive(Debug, PartialEq)]
enum Parsed {
    Token(String),
    Done,
    Error(String),
    Skip,
}

type EventParser = fn(&str, &mut Option<usize>) -> Parsed;

fn add_tokens(total: &mut Option<usize>, n: Option<u64>) {
    if let Some(n) = n {
        *total = Some(total.unwrap_or(0) + n as usize);
    }
}

/// OpenAI-compatible `data:` payloads: `choices[0].delta.content`, `[DONE]`, optional usage.
fn parse_openai_event(data: &str, tokens: &mut Option<usize>) -> Parsed {
    if data.trim() == "[DONE]" {
        return Parsed::Done;
    }
    let Ok(parsed) = serde_json::from_str::<Value>(data) else {
        return Parsed::Skip;
    };
    if let Some(err) = parsed.get("error") {
        let msg = err["message"].as_str().unwrap_or("Unknown error");
        return Parsed::Error(msg.to_string());
    }
    if let Some(total) = parsed["usage"]["total_tokens"].as_u64() {
        *tokens = Some(total as usize);
    }
    match parsed["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Parsed::Token(content.to_string()),
        _ => Parsed::Skip,
    }
}

/// Anthropic `data:` payloads, keyed by their `type` field.
fn parse_anthropic_event(data: &str, tokens: &mut Option<usize>) -> Parsed {
    let Ok(parsed) = serde_json::from_str::<Value>(data) else {
        return Parsed::Skip;
    };
    match parsed["type"].as_str() {
        Some("message_start") => {
            add_tokens(tokens, parsed["message"]["usage"]["input_tokens"].as_u64());
            Parsed::Skip
        }
        Some("content_block_delta") => match parsed["delta"]["text"].as_str() {
            Some(text) if !text.is_empty() => Parsed::Token(text.to_string()),
            _ => Parsed::Skip,
        },
        Some("message_delta") => {
            add_tokens(tokens, parsed["usage"]["output_tokens"].as_u64());
            Parsed::Skip
        }
        Some("message_stop") => Parsed::Done,
        Some("error") => {
            let msg = parsed["error"]["message"].as_str().unwrap_or("Unknown error");
            Parsed::Error(msg.to_string())
        }
        _ => Parsed::Skip,
    }
}

fn sse_stream(
    request: RequestBuilder,
    parse: EventParser,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    async_stream::stream! {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut body = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        let mut tokens_used: Option<usize> = None;

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            for line in lines.push(&bytes) {
                let Some(data) = data_payload(&line) else { continue };
                match parse(data, &mut tokens_used) {
                    Parsed::Token(text) => yield StreamChunk::Token(text),
                    Parsed::Done => {
                        yield StreamChunk::Done { tokens_used };
                        return;
                    }
                    Parsed::Error(msg) => {
                        error!("Provider stream error: {}", msg);
                        yield StreamChunk::Error(msg);
                        return;
                    }
                    Parsed::Skip => {}
                }
            }
        }

        if let Some(line) = lines.finish() {
            if let Some(data) = data_payload(&line) {
                match parse(data, &mut tokens_used) {
                    Parsed::Token(text) => yield StreamChunk::Token(text),
                    Parsed::Error(msg) => {
                        yield StreamChunk::Error(msg);
                        return;
                    }
                    Parsed::Done | Parsed::Skip => {}
                }
            }
        }

        yield StreamChunk::Done { tokens_used };
    }
}
