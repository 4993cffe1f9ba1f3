//! Context enrichment seam.

use async_trait::async_trait;
use quill_core::{AgentError, Message};
use tracing::debug;

use crate::intent::Intent;

/// Supplementary context resolved for an intent.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    /// Context text to inject as a system message. Empty when unused.
    pub text: String,
    /// Whether the pipeline should inject `text`.
    pub used: bool,
}

impl Enrichment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn context(text: impl Into<String>) -> Self {
        Self { text: text.into(), used: true }
    }
}

/// Resolves supplementary context for a conversation.
///
/// Seam for a real knowledge lookup. Implementations must be bounded in
/// latency and safe to fail; the pipeline degrades to no context on error.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        conversation: &[Message],
        intent: Intent,
    ) -> Result<Enrichment, AgentError>;
}

/// Built-in enricher backed by static lookups.
#[derive(Debug, Default)]
pub struct KeywordEnricher;

#[async_trait]
impl Enricher for KeywordEnricher {
    async fn enrich(
        &self,
        _conversation: &[Message],
        intent: Intent,
    ) -> Result<Enrichment, AgentError> {
        debug!(intent = intent.as_str(), "resolving context");

        // Stands in for a database/API lookup keyed on the intent.
        match intent {
            Intent::OrderInquiry => Ok(Enrichment::context(
                "Context: The user has active orders #12345, #67890",
            )),
            _ => Ok(Enrichment::none()),
        }
    }
}
