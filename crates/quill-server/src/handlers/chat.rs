//! The chat endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{error, info};

use quill_llm::{ChatRequest, CompletionRelay, StreamChunk};
use quill_trace::{spawn_ttl_watchdog, TraceCoordinator};

use crate::dto::ChatRequestBody;
use crate::error::AppError;
use crate::services::completion::spawn_finalizer;
use crate::state::AppState;

/// How many trailing messages are recorded as trace input.
const TRACE_CONTEXT_MESSAGES: usize = 10;

/// POST /api/chat — stream a model response for a conversation.
///
/// The SSE response starts as soon as the model produces tokens; the trace
/// for the request is finalized later, from the completion task, after this
/// handler has already returned.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let body: ChatRequestBody = serde_json::from_value(raw)
        .map_err(|_| AppError::bad_request("messages must be an array of messages"))?;
    if body.messages.is_empty() {
        return Err(AppError::bad_request("messages must not be empty"));
    }
    let messages = body.messages;

    // Root trace opens before any pipeline work; no trace exists for
    // malformed requests rejected above.
    let tail = &messages[messages.len().saturating_sub(TRACE_CONTEXT_MESSAGES)..];
    let coordinator = Arc::new(TraceCoordinator::open(
        state.exporter.clone(),
        "chat-request",
        serde_json::to_value(tail).unwrap_or(Value::Null),
        json!({ "model": state.llm.model(), "userId": "anonymous" }),
        vec!["chat".into()],
    ));

    let outcome = state.agent.process(&messages).await;
    if let Some(fault) = outcome.fault() {
        coordinator.annotate(json!({
            "agent.degraded": true,
            "agent.fault": fault.as_str(),
        }));
    }
    let result = outcome.into_result();

    info!(
        trace_id = %coordinator.trace_id(),
        intent = result.intent.as_str(),
        context_used = result.metadata.context_used,
        processing_time_ms = result.metadata.processing_time_ms,
        "agent pipeline resolved"
    );
    coordinator.annotate(json!({
        "agent.intent": result.intent.as_str(),
        "agent.context_used": result.metadata.context_used,
        "agent.processing_time_ms": result.metadata.processing_time_ms,
    }));

    coordinator.start_generation(
        "chat-completion",
        state.llm.model(),
        serde_json::to_value(&result.enhanced_messages).unwrap_or(Value::Null),
    );

    let request = ChatRequest {
        system_prompt: result.system_prompt.to_string(),
        messages: result.enhanced_messages,
        temperature: result.parameters.temperature,
    };

    let stream = match state.llm.chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(trace_id = %coordinator.trace_id(), error = %e, "model call failed");
            coordinator.fail("model call failed");
            let exporter = state.exporter.clone();
            state.flusher.schedule(async move { exporter.flush().await });
            coordinator.mark_flushed();
            return Err(AppError::Upstream("upstream model request failed".into()));
        }
    };

    // Completion is a channel handoff: the relay fires it when the stream
    // ends, the finalizer task closes the trace, the watchdog backstops a
    // client that never drains the stream.
    let (relay, completion) = CompletionRelay::new(stream);
    spawn_finalizer(
        coordinator.clone(),
        completion,
        state.flusher.clone(),
        state.exporter.clone(),
    );
    spawn_ttl_watchdog(
        coordinator,
        state.trace_ttl,
        state.flusher.clone(),
        state.exporter.clone(),
    );

    let events = relay.filter_map(|chunk| async move {
        match chunk {
            Ok(StreamChunk::Content(text)) => Some(Ok(Event::default().data(text))),
            Ok(StreamChunk::Finish(reason)) => {
                Some(Ok(Event::default().event("done").data(reason)))
            }
            Ok(StreamChunk::Usage(_)) => None,
            Err(e) => {
                error!(error = %e, "model stream error");
                Some(Ok(Event::default().event("error").data("stream interrupted")))
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_agent::AgentPipeline;
    use quill_llm::{ChatClient, LlmConfig};
    use quill_trace::{ExporterConfig, FlushScheduler, TraceExporter};
    use std::time::Duration;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            agent: AgentPipeline::default(),
            llm: ChatClient::new(LlmConfig {
                api_key: "sk-test".into(),
                api_base: "http://127.0.0.1:9".into(),
                model: "test-model".into(),
            }),
            exporter: Arc::new(TraceExporter::new(ExporterConfig {
                public_key: "pk-test".into(),
                secret_key: "sk-test".into(),
                host: "http://127.0.0.1:9".into(),
                sample_rate: None,
                debug: false,
            })),
            flusher: FlushScheduler::new(),
            trace_ttl: Duration::from_secs(120),
        })
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_without_a_trace() {
        let state = test_state();
        let result = chat(State(state.clone()), Json(json!({ "messages": [] }))).await;

        match result {
            Err(AppError::BadRequest(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("empty conversation must be rejected"),
        }
        // No trace or generation event was ever buffered.
        assert_eq!(state.exporter.pending(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_without_a_trace() {
        let state = test_state();
        let result = chat(State(state.clone()), Json(json!({ "messages": "nope" }))).await;

        assert!(matches!(result.err(), Some(AppError::BadRequest(_))));
        assert_eq!(state.exporter.pending(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_maps_to_upstream_error() {
        // The configured api_base refuses connections, so the model call
        // fails after the generation has started.
        let state = test_state();
        let result = chat(
            State(state.clone()),
            Json(json!({ "messages": [{ "role": "user", "content": "hello" }] })),
        )
        .await;

        match result {
            Err(AppError::Upstream(message)) => {
                // Generic failure payload, no raw error text.
                assert!(!message.contains("127.0.0.1"));
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("unroutable provider must fail the request"),
        }
    }
}
