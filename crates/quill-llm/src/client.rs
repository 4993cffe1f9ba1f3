//! OpenAI-compatible chat completion client with streaming support.

use futures::StreamExt;
use quill_core::{AgentError, Message, Role, Usage};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{ChatStream, StreamChunk};

/// Connection settings for the model provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    /// Model identifier sent with every request.
    pub model: String,
}

/// One configured model call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<WireUsage>,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Issues a streaming chat request.
    ///
    /// Token chunks begin arriving immediately; the usage chunk and finish
    /// reason arrive at the tail of the stream.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, AgentError> {
        let mut messages = vec![WireMessage { role: "system", content: request.system_prompt }];
        messages.extend(request.messages.iter().map(|msg| WireMessage {
            role: match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            },
            content: msg.text_content(),
        }));

        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature,
            stream: true,
            stream_options: StreamOptions { include_usage: true },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmError(format!(
                "completion API error {}: {}",
                status, body
            )));
        }

        Ok(parse_sse_stream(response.bytes_stream()))
    }
}

/// Parses a provider SSE byte stream into [`StreamChunk`]s.
///
/// Maintains a line buffer across byte chunks so SSE events split mid-line
/// are reassembled before parsing.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> ChatStream
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    let mapped = byte_stream
        .scan(String::new(), |buffer, result| {
            let chunks: Vec<Result<StreamChunk, AgentError>> = match result {
                Err(e) => vec![Err(AgentError::LlmError(e.to_string()))],
                Ok(bytes) => {
                    let text = match String::from_utf8(bytes.to_vec()) {
                        Ok(t) => t,
                        Err(_) => return futures::future::ready(Some(vec![])),
                    };

                    buffer.push_str(&text);

                    let mut parsed = Vec::new();

                    // Process complete lines, keep the incomplete tail.
                    while let Some(newline_pos) = buffer.find('\n') {
                        let line = buffer[..newline_pos].trim().to_string();
                        *buffer = buffer[newline_pos + 1..].to_string();

                        if !line.starts_with("data: ") {
                            continue;
                        }
                        let json = &line[6..];
                        if json == "[DONE]" {
                            continue;
                        }

                        let chunk: CompletionChunk = match serde_json::from_str(json) {
                            Ok(c) => c,
                            Err(e) => {
                                error!("Failed to parse completion chunk: {} - {}", e, json);
                                continue;
                            }
                        };

                        for choice in &chunk.choices {
                            if let Some(delta) = &choice.delta {
                                if let Some(content) = &delta.content {
                                    if !content.is_empty() {
                                        parsed.push(Ok(StreamChunk::Content(content.clone())));
                                    }
                                }
                            }
                            if let Some(reason) = &choice.finish_reason {
                                parsed.push(Ok(StreamChunk::Finish(reason.clone())));
                            }
                        }

                        if let Some(usage) = chunk.usage {
                            parsed.push(Ok(StreamChunk::Usage(Usage {
                                input_tokens: usage.prompt_tokens,
                                output_tokens: usage.completion_tokens,
                                total_tokens: usage.total_tokens,
                            })));
                        }
                    }
                    parsed
                }
            };
            futures::future::ready(Some(chunks))
        })
        .flat_map(futures::stream::iter);

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn bytes_stream(
        parts: Vec<&'static str>,
    ) -> impl futures::Stream<Item = Result<bytes::Bytes, Infallible>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(bytes::Bytes::from(p))))
    }

    async fn collect(parts: Vec<&'static str>) -> Vec<StreamChunk> {
        parse_sse_stream(bytes_stream(parts))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_parses_content_finish_and_usage() {
        let chunks = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert!(matches!(&chunks[0], StreamChunk::Content(t) if t == "Hel"));
        assert!(matches!(&chunks[1], StreamChunk::Content(t) if t == "lo"));
        assert!(matches!(&chunks[2], StreamChunk::Finish(r) if r == "stop"));
        assert!(matches!(
            &chunks[3],
            StreamChunk::Usage(u) if u.output_tokens == Some(2) && u.total_tokens == Some(5)
        ));
        assert_eq!(chunks.len(), 4);
    }

    #[tokio::test]
    async fn test_reassembles_lines_split_across_byte_chunks() {
        let chunks = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"cont",
            "ent\":\"split\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], StreamChunk::Content(t) if t == "split"));
    }

    #[tokio::test]
    async fn test_skips_malformed_events_and_comments() {
        let chunks = collect(vec![
            ": keep-alive\n\n",
            "data: {not json}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        ])
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], StreamChunk::Content(t) if t == "ok"));
    }
}
