//! Request-scoped trace lifecycle coordination.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use quill_core::CompletionOutcome;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::exporter::TraceExporter;
use crate::flush::FlushScheduler;
use crate::record::{EventKind, GenerationBody, IngestionEvent, TraceBody, TraceStatus};

/// What a finalize call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeDisposition {
    /// The generation was finalized by this call.
    Applied,
    /// The trace was already in a terminal state; the call was a no-op.
    AlreadyFinalized,
    /// No generation was ever started; the call was logged and dropped.
    NotStarted,
}

/// Lifecycle phase of a request's trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opened,
    GenerationStarted,
    GenerationFinalized,
    Flushed,
    /// Terminal error or abandonment.
    Failed,
}

struct Inner {
    phase: Phase,
    generation_id: Option<String>,
}

/// Owns the trace and generation records for exactly one request.
///
/// The handler and the asynchronous completion task share the coordinator
/// through an `Arc`; the state machine behind the internal mutex is what
/// makes the ordering and idempotence guarantees hold even though the
/// completion callback fires after the handler has already returned its
/// response.
///
/// Transitions: `Opened → GenerationStarted → GenerationFinalized → Flushed`,
/// with `Failed` reachable from the first two phases via [`fail`] or
/// [`abandon`].
///
/// [`fail`]: TraceCoordinator::fail
/// [`abandon`]: TraceCoordinator::abandon
pub struct TraceCoordinator {
    exporter: Arc<TraceExporter>,
    trace_id: String,
    sampled: bool,
    inner: Mutex<Inner>,
}

impl TraceCoordinator {
    /// Opens the root trace for a request and emits its create event.
    pub fn open(
        exporter: Arc<TraceExporter>,
        name: &str,
        input: Value,
        metadata: Value,
        tags: Vec<String>,
    ) -> Self {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let sampled = exporter.sample();

        let coordinator = Self {
            exporter,
            trace_id: trace_id.clone(),
            sampled,
            inner: Mutex::new(Inner { phase: Phase::Opened, generation_id: None }),
        };

        coordinator.record(
            EventKind::TraceCreate,
            serde_json::to_value(TraceBody {
                id: trace_id,
                name: Some(name.to_string()),
                input: Some(input),
                metadata: Some(metadata),
                tags: Some(tags),
                status: Some(TraceStatus::Running),
                ..Default::default()
            }),
        );

        coordinator
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Starts the generation record for the model call.
    ///
    /// Must be called from `Opened`, synchronously before the model call is
    /// issued. A call from any other phase is logged and ignored.
    pub fn start_generation(&self, name: &str, model: &str, input: Value) {
        let mut inner = self.lock();
        if inner.phase != Phase::Opened {
            warn!(
                trace_id = %self.trace_id,
                phase = ?inner.phase,
                "start_generation called out of order; ignoring"
            );
            return;
        }

        let generation_id = uuid::Uuid::new_v4().to_string();
        inner.generation_id = Some(generation_id.clone());
        inner.phase = Phase::GenerationStarted;
        drop(inner);

        self.record(
            EventKind::GenerationCreate,
            serde_json::to_value(GenerationBody {
                id: generation_id,
                trace_id: self.trace_id.clone(),
                name: Some(name.to_string()),
                model: Some(model.to_string()),
                input: Some(input),
                ..Default::default()
            }),
        );
    }

    /// Finalizes the generation with the model's terminal event.
    ///
    /// Called from the completion task, never from the synchronous handler
    /// path. Idempotent-guarded: a second call is a no-op, and a call
    /// without a preceding [`start_generation`] is dropped.
    ///
    /// [`start_generation`]: TraceCoordinator::start_generation
    pub fn finalize_generation(&self, outcome: &CompletionOutcome) -> FinalizeDisposition {
        let mut inner = self.lock();
        match inner.phase {
            Phase::GenerationStarted => {
                let generation_id = inner.generation_id.clone().unwrap_or_default();
                inner.phase = Phase::GenerationFinalized;
                drop(inner);

                self.record(
                    EventKind::GenerationUpdate,
                    serde_json::to_value(GenerationBody {
                        id: generation_id,
                        trace_id: self.trace_id.clone(),
                        output: Some(Value::String(outcome.text.clone())),
                        usage: Some(outcome.usage.normalized()),
                        finish_reason: Some(outcome.finish_reason.clone()),
                        ..Default::default()
                    }),
                );
                self.record(
                    EventKind::TraceUpdate,
                    serde_json::to_value(TraceBody {
                        id: self.trace_id.clone(),
                        output: Some(Value::String(outcome.text.clone())),
                        status: Some(TraceStatus::Success),
                        ..Default::default()
                    }),
                );

                debug!(trace_id = %self.trace_id, "generation finalized");
                FinalizeDisposition::Applied
            }
            Phase::GenerationFinalized | Phase::Flushed | Phase::Failed => {
                FinalizeDisposition::AlreadyFinalized
            }
            Phase::Opened => {
                warn!(
                    trace_id = %self.trace_id,
                    "finalize without a started generation; dropping"
                );
                FinalizeDisposition::NotStarted
            }
        }
    }

    /// Appends metadata to the open trace.
    ///
    /// Attributes are append-only until the trace is finalized; calls after
    /// a terminal transition are dropped.
    pub fn annotate(&self, metadata: Value) {
        {
            let inner = self.lock();
            if !matches!(inner.phase, Phase::Opened | Phase::GenerationStarted) {
                return;
            }
        }
        self.record(
            EventKind::TraceUpdate,
            serde_json::to_value(TraceBody {
                id: self.trace_id.clone(),
                metadata: Some(metadata),
                ..Default::default()
            }),
        );
    }

    /// Terminal error transition. Returns whether this call applied it.
    ///
    /// If a generation is open it is annotated with the error instead of
    /// output; the root trace status becomes `Error` either way.
    pub fn fail(&self, error: &str) -> bool {
        self.close(TraceStatus::Error, "ERROR", error)
    }

    /// Closes a trace whose completion event never arrived.
    ///
    /// No-op once the trace is finalized; safe to call from the TTL
    /// watchdog at any time.
    pub fn abandon(&self) -> bool {
        self.close(TraceStatus::Abandoned, "WARNING", "client-abandoned")
    }

    /// Marks the trace as handed to the flush scheduler.
    pub fn mark_flushed(&self) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::GenerationFinalized | Phase::Failed) {
            inner.phase = Phase::Flushed;
        }
    }

    fn close(&self, status: TraceStatus, level: &'static str, message: &str) -> bool {
        let mut inner = self.lock();
        let generation_id = match inner.phase {
            Phase::Opened => None,
            Phase::GenerationStarted => inner.generation_id.clone(),
            // Already terminal or finalized.
            Phase::GenerationFinalized | Phase::Flushed | Phase::Failed => return false,
        };
        inner.phase = Phase::Failed;
        drop(inner);

        if let Some(generation_id) = generation_id {
            self.record(
                EventKind::GenerationUpdate,
                serde_json::to_value(GenerationBody {
                    id: generation_id,
                    trace_id: self.trace_id.clone(),
                    level: Some(level),
                    status_message: Some(message.to_string()),
                    ..Default::default()
                }),
            );
        }
        self.record(
            EventKind::TraceUpdate,
            serde_json::to_value(TraceBody {
                id: self.trace_id.clone(),
                status: Some(status),
                metadata: Some(serde_json::json!({ "error": message })),
                ..Default::default()
            }),
        );

        warn!(trace_id = %self.trace_id, status = status.as_str(), "trace closed: {}", message);
        true
    }

    fn record(&self, kind: EventKind, body: Result<Value, serde_json::Error>) {
        if !self.sampled {
            return;
        }
        match body {
            Ok(body) => self.exporter.record(IngestionEvent::new(kind, body)),
            Err(e) => warn!(trace_id = %self.trace_id, error = %e, "failed to encode event"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned trace mutex only loses telemetry for this request.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Spawns the bounded time-to-live watchdog for an open trace.
///
/// If the trace is still unfinalized when `ttl` elapses, it is closed with
/// an abandoned status and a flush is scheduled so the record still leaves
/// the process. Returns whether the watchdog had to act.
pub fn spawn_ttl_watchdog(
    coordinator: Arc<TraceCoordinator>,
    ttl: Duration,
    flusher: FlushScheduler,
    exporter: Arc<TraceExporter>,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let abandoned = coordinator.abandon();
        if abandoned {
            flusher.schedule(async move { exporter.flush().await });
        }
        abandoned
    })
}
