//! Core domain types shared across the quill workspace.
//!
//! This crate provides the fundamental types used by the agent pipeline,
//! the LLM client and the trace layer:
//!
//! - [`Message`], [`Role`] and [`MessageContent`] — conversation messages
//!   with either plain-string or typed-part content
//! - [`Usage`] — token usage counters as reported by the model provider
//! - [`AgentError`] — error type for pipeline and LLM operations
//!
//! # Example
//!
//! ```rust
//! use quill_core::{Message, Role};
//!
//! let msg = Message::user("Hello!");
//! assert_eq!(msg.role, Role::User);
//! assert_eq!(msg.text_content(), "Hello!");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during pipeline execution or LLM operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM API request failed.
    #[error("LLM request failed: {0}")]
    LlmError(String),

    /// Failed to parse a provider payload.
    #[error("Failed to parse provider payload: {0}")]
    ParseError(String),

    /// Context enrichment failed.
    #[error("Enrichment failed: {0}")]
    EnrichmentFailed(String),

    /// Pipeline step exceeded its time budget.
    #[error("Pipeline timed out")]
    Timeout,
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::ParseError(err.to_string())
    }
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user.
    User,
    /// Message from the assistant/LLM.
    Assistant,
    /// Instruction or injected context.
    System,
}

/// One typed part of a structured message body.
///
/// Only text parts contribute to routing; unknown part types are accepted
/// on the wire and ignored by [`Message::text_content`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// Any part type this service does not interpret.
    #[serde(other)]
    Other,
}

/// Message body: either a plain string or an ordered sequence of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The content of the message.
    pub content: MessageContent,
}

impl Message {
    /// Creates a new user message with plain-string content.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(content.into()) }
    }

    /// Creates a new assistant message with plain-string content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(content.into()) }
    }

    /// Creates a new system message with plain-string content.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(content.into()) }
    }

    /// Extracts the textual content of this message.
    ///
    /// String content passes through unchanged. For part lists, all text
    /// parts are concatenated with single spaces and non-text parts are
    /// skipped. A message without any text yields the empty string.
    pub fn text_content(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Token usage as reported by the model provider.
///
/// All fields are optional at capture time; providers routinely omit one
/// or more counters on streamed responses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Usage with every absent counter normalized to zero.
///
/// This is the only form that reaches the trace exporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl Usage {
    /// Normalizes absent counters to zero.
    pub fn normalized(&self) -> NormalizedUsage {
        NormalizedUsage {
            input: self.input_tokens.unwrap_or(0),
            output: self.output_tokens.unwrap_or(0),
            total: self.total_tokens.unwrap_or(0),
        }
    }
}

/// Terminal event of one streamed model call.
///
/// Produced exactly once per stream, after the incremental chunks, and
/// delivered to the trace layer over an explicit completion channel.
#[derive(Debug, Clone, Default)]
pub struct CompletionOutcome {
    /// Full accumulated output text.
    pub text: String,
    /// Provider finish reason; `"stop"` when unreported.
    pub finish_reason: String,
    /// Usage counters as reported; normalize before export.
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_plain_string() {
        let msg = Message::user("hello there");
        assert_eq!(msg.text_content(), "hello there");
    }

    #[test]
    fn test_text_content_joins_text_parts() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "first".into() },
                ContentPart::Other,
                ContentPart::Text { text: "second".into() },
            ]),
        };
        assert_eq!(msg.text_content(), "first second");
    }

    #[test]
    fn test_text_content_non_text_parts_yield_empty() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::Other]),
        };
        assert_eq!(msg.text_content(), "");
    }

    #[test]
    fn test_message_deserializes_typed_parts() {
        let json = r#"{"role":"user","content":[{"type":"text","text":"hi"},{"type":"image","url":"x"}]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text_content(), "hi");
    }

    #[test]
    fn test_usage_normalization_fills_absent_counters() {
        let usage = Usage { input_tokens: None, output_tokens: Some(5), total_tokens: None };
        assert_eq!(
            usage.normalized(),
            NormalizedUsage { input: 0, output: 5, total: 0 }
        );
    }
}
