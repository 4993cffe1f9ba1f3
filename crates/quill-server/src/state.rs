//! Shared server state.

use std::sync::Arc;
use std::time::Duration;

use quill_agent::AgentPipeline;
use quill_llm::ChatClient;
use quill_trace::{FlushScheduler, TraceExporter};

use crate::config::ServerConfig;

/// Process-wide state handed to every request handler.
///
/// The exporter is the one shared mutable resource; everything else is
/// either immutable configuration or per-request.
pub struct AppState {
    pub agent: AgentPipeline,
    pub llm: ChatClient,
    pub exporter: Arc<TraceExporter>,
    pub flusher: FlushScheduler,
    pub trace_ttl: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            agent: AgentPipeline::default(),
            llm: ChatClient::new(config.llm.clone()),
            exporter: Arc::new(TraceExporter::new(config.exporter.clone())),
            flusher: FlushScheduler::new(),
            trace_ttl: config.trace_ttl,
        }
    }
}
