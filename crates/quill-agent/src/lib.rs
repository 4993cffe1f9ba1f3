//! Intent-routing agent pipeline.
//!
//! Transforms a raw conversation into an enriched conversation plus a
//! response strategy: classify the latest message, look up a strategy,
//! resolve optional context, and append the context as a system message.
//!
//! The pipeline never fails. Empty or text-less conversations short-circuit
//! to the default strategy, and any internal fault or timeout degrades to
//! the same default while carrying the fault in [`AgentOutcome::Degraded`]
//! so callers and tests can observe that degradation happened.

mod enrich;
mod intent;
mod strategy;

pub use enrich::{Enricher, Enrichment, KeywordEnricher};
pub use intent::{classify, Intent};
pub use strategy::{SamplingParams, Strategy};

use std::sync::Arc;
use std::time::{Duration, Instant};

use quill_core::Message;
use tracing::{info_span, warn, Instrument};

/// Default wall-clock budget for one pipeline run.
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata stamped on every pipeline result.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentMetadata {
    /// Whether enrichment context was injected.
    pub context_used: bool,
    /// Elapsed wall-clock time for the pipeline run.
    pub processing_time_ms: u64,
}

/// Output of one pipeline run. Immutable after creation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub system_prompt: &'static str,
    pub enhanced_messages: Vec<Message>,
    pub parameters: SamplingParams,
    pub intent: Intent,
    pub metadata: AgentMetadata,
}

/// Fault that caused a pipeline run to degrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentFault {
    /// Context enrichment failed.
    Enrichment(String),
    /// The run exceeded its time budget.
    Timeout,
}

impl AgentFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentFault::Enrichment(_) => "enrichment",
            AgentFault::Timeout => "timeout",
        }
    }
}

/// Result of a pipeline run.
///
/// `Degraded` carries the default result together with the fault that
/// forced the fallback; callers treat both variants as usable output.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    Ok(AgentResult),
    Degraded { result: AgentResult, fault: AgentFault },
}

impl AgentOutcome {
    /// The usable result, regardless of degradation.
    pub fn result(&self) -> &AgentResult {
        match self {
            AgentOutcome::Ok(r) => r,
            AgentOutcome::Degraded { result, .. } => result,
        }
    }

    pub fn into_result(self) -> AgentResult {
        match self {
            AgentOutcome::Ok(r) => r,
            AgentOutcome::Degraded { result, .. } => result,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AgentOutcome::Degraded { .. })
    }

    pub fn fault(&self) -> Option<&AgentFault> {
        match self {
            AgentOutcome::Ok(_) => None,
            AgentOutcome::Degraded { fault, .. } => Some(fault),
        }
    }
}

/// The intent-routing pipeline: classify → strategy → enrich.
pub struct AgentPipeline {
    enricher: Arc<dyn Enricher>,
    timeout: Duration,
}

impl Default for AgentPipeline {
    fn default() -> Self {
        Self::new(Arc::new(KeywordEnricher))
    }
}

impl AgentPipeline {
    pub fn new(enricher: Arc<dyn Enricher>) -> Self {
        Self { enricher, timeout: DEFAULT_PIPELINE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the pipeline over a conversation.
    ///
    /// Never returns an error: faults and timeouts produce
    /// [`AgentOutcome::Degraded`] with the default strategy and the
    /// conversation unchanged.
    pub async fn process(&self, messages: &[Message]) -> AgentOutcome {
        let start = Instant::now();

        let mut outcome = match tokio::time::timeout(self.timeout, self.run(messages)).await {
            Ok(Ok(result)) => AgentOutcome::Ok(result),
            Ok(Err(fault)) => {
                warn!(fault = fault.as_str(), "agent pipeline degraded");
                AgentOutcome::Degraded { result: default_result(messages), fault }
            }
            Err(_) => {
                warn!("agent pipeline timed out");
                AgentOutcome::Degraded {
                    result: default_result(messages),
                    fault: AgentFault::Timeout,
                }
            }
        };

        let elapsed = start.elapsed().as_millis() as u64;
        match &mut outcome {
            AgentOutcome::Ok(r) | AgentOutcome::Degraded { result: r, .. } => {
                r.metadata.processing_time_ms = elapsed;
            }
        }
        outcome
    }

    async fn run(&self, messages: &[Message]) -> Result<AgentResult, AgentFault> {
        let Some(last) = messages.last() else {
            return Ok(default_result(messages));
        };

        let text = last.text_content();
        if text.is_empty() {
            return Ok(default_result(messages));
        }

        let intent = {
            let span = info_span!("agent.classify", input_len = text.len());
            let _guard = span.enter();
            classify(&text)
        };

        let strategy = Strategy::for_intent(intent);

        let enrichment = self
            .enricher
            .enrich(messages, intent)
            .instrument(info_span!("agent.enrich", intent = intent.as_str()))
            .await
            .map_err(|e| AgentFault::Enrichment(e.to_string()))?;

        // Never mutate the caller's conversation; build a new sequence.
        let mut enhanced = messages.to_vec();
        if enrichment.used {
            enhanced.push(Message::system(enrichment.text));
        }

        Ok(AgentResult {
            system_prompt: strategy.system_prompt,
            enhanced_messages: enhanced,
            parameters: strategy.parameters,
            intent,
            metadata: AgentMetadata { context_used: enrichment.used, processing_time_ms: 0 },
        })
    }
}

fn default_result(messages: &[Message]) -> AgentResult {
    let strategy = Strategy::default();
    AgentResult {
        system_prompt: strategy.system_prompt,
        enhanced_messages: messages.to_vec(),
        parameters: strategy.parameters,
        intent: Intent::General,
        metadata: AgentMetadata::default(),
    }
}
