//! Streaming chat-completion client.
//!
//! [`ChatClient`] issues OpenAI-compatible streaming requests and parses
//! the provider's SSE byte stream into [`StreamChunk`]s. [`CompletionRelay`]
//! wraps the resulting stream so the terminal text/usage event is delivered
//! over an explicit channel once generation ends, decoupled from the
//! handler that issued the call.

mod client;
mod relay;

pub use client::{parse_sse_stream, ChatClient, ChatRequest, LlmConfig};
pub use relay::CompletionRelay;

use std::pin::Pin;

use futures::Stream;
use quill_core::{AgentError, Usage};

/// One item of a model's incremental response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A piece of generated text.
    Content(String),
    /// The provider's finish reason.
    Finish(String),
    /// Token usage, reported at the tail of the stream.
    Usage(Usage),
}

/// Boxed stream of response chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, AgentError>> + Send>>;
