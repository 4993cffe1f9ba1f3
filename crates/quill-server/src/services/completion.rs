//! Asynchronous completion handling for traced chat requests.

use std::sync::Arc;

use quill_core::CompletionOutcome;
use quill_trace::{FlushScheduler, TraceCoordinator, TraceExporter};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawns the task that finalizes a trace once the model's completion
/// event arrives.
///
/// The handler has usually already returned its streaming response by the
/// time the channel fires; this task is the only place the generation is
/// finalized. A closed channel means the stream was dropped before its
/// terminal event — the client went away — so the trace is closed as
/// abandoned instead. Either way the export is handed to the flush
/// scheduler rather than awaited, so nothing here delays anything.
pub fn spawn_finalizer(
    coordinator: Arc<TraceCoordinator>,
    completion: oneshot::Receiver<CompletionOutcome>,
    flusher: FlushScheduler,
    exporter: Arc<TraceExporter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match completion.await {
            Ok(outcome) => {
                let disposition = coordinator.finalize_generation(&outcome);
                debug!(
                    trace_id = %coordinator.trace_id(),
                    disposition = ?disposition,
                    output_len = outcome.text.len(),
                    "completion received"
                );
            }
            Err(_) => {
                coordinator.abandon();
            }
        }

        flusher.schedule(async move { exporter.flush().await });
        coordinator.mark_flushed();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use quill_core::Usage;
    use quill_llm::{CompletionRelay, StreamChunk};
    use quill_trace::{ExporterConfig, Phase};

    fn exporter() -> Arc<TraceExporter> {
        Arc::new(TraceExporter::new(ExporterConfig {
            public_key: "pk-test".into(),
            secret_key: "sk-test".into(),
            host: "http://127.0.0.1:9".into(),
            sample_rate: None,
            debug: false,
        }))
    }

    fn started_coordinator(exporter: &Arc<TraceExporter>) -> Arc<TraceCoordinator> {
        let c = Arc::new(TraceCoordinator::open(
            exporter.clone(),
            "chat-request",
            serde_json::json!([]),
            serde_json::json!({}),
            vec![],
        ));
        c.start_generation("chat-completion", "test-model", serde_json::json!([]));
        c
    }

    #[tokio::test]
    async fn test_completion_finalizes_and_schedules_flush() {
        let exporter = exporter();
        let coordinator = started_coordinator(&exporter);
        let flusher = FlushScheduler::new();

        let (tx, rx) = oneshot::channel();
        let handle = spawn_finalizer(coordinator.clone(), rx, flusher.clone(), exporter.clone());

        tx.send(CompletionOutcome {
            text: "final text".into(),
            finish_reason: "stop".into(),
            usage: Usage { input_tokens: Some(1), output_tokens: Some(2), total_tokens: Some(3) },
        })
        .unwrap();

        handle.await.unwrap();
        assert_eq!(coordinator.phase(), Phase::Flushed);
        assert!(flusher.drain(std::time::Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_closed_channel_abandons_trace() {
        let exporter = exporter();
        let coordinator = started_coordinator(&exporter);
        let flusher = FlushScheduler::new();

        let (tx, rx) = oneshot::channel::<CompletionOutcome>();
        let handle = spawn_finalizer(coordinator.clone(), rx, flusher.clone(), exporter.clone());

        // Client disconnects: the relay (and its sender) is dropped.
        drop(tx);

        handle.await.unwrap();
        assert_eq!(coordinator.phase(), Phase::Flushed);
        assert!(flusher.drain(std::time::Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_drained_relay_drives_finalization() {
        let exporter = exporter();
        let coordinator = started_coordinator(&exporter);
        let flusher = FlushScheduler::new();

        let chunks: Vec<Result<StreamChunk, quill_core::AgentError>> = vec![
            Ok(StreamChunk::Content("I can ".into())),
            Ok(StreamChunk::Content("help with that.".into())),
            Ok(StreamChunk::Finish("stop".into())),
            Ok(StreamChunk::Usage(Usage {
                input_tokens: Some(12),
                output_tokens: Some(5),
                total_tokens: Some(17),
            })),
        ];
        let (relay, completion) = CompletionRelay::new(Box::pin(futures::stream::iter(chunks)));
        let handle =
            spawn_finalizer(coordinator.clone(), completion, flusher.clone(), exporter.clone());

        // The transport drains the stream; tokens flow before finalize.
        let streamed: Vec<_> = relay.map(|r| r.unwrap()).collect().await;
        assert_eq!(streamed.len(), 4);

        handle.await.unwrap();
        assert_eq!(coordinator.phase(), Phase::Flushed);
        assert!(flusher.drain(std::time::Duration::from_secs(5)).await);
    }
}
