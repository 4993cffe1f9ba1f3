//! Request trace lifecycle and telemetry export.
//!
//! One [`TraceCoordinator`] per request owns the trace and generation
//! records; the process-wide [`TraceExporter`] buffers their ingestion
//! events and ships them to the telemetry backend; the [`FlushScheduler`]
//! lets those exports outlive the handler that produced them.

mod coordinator;
mod exporter;
mod flush;
mod record;

pub use coordinator::{spawn_ttl_watchdog, FinalizeDisposition, Phase, TraceCoordinator};
pub use exporter::{ExporterConfig, TraceExporter};
pub use flush::FlushScheduler;
pub use record::{EventKind, GenerationBody, IngestionEvent, TraceBody, TraceStatus};

pub use quill_core::CompletionOutcome;
