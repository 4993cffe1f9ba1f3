//! Buffered HTTP exporter for the telemetry backend.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

use crate::record::IngestionEvent;

/// Configuration for the telemetry backend connection.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub public_key: String,
    pub secret_key: String,
    /// Base URL of the backend, e.g. `https://cloud.langfuse.com`.
    pub host: String,
    /// Probability in `[0, 1]` that a trace is kept. `None` keeps all.
    pub sample_rate: Option<f64>,
    /// Log every buffered event at debug level.
    pub debug: bool,
}

#[derive(Serialize)]
struct IngestionBatch<'a> {
    batch: &'a [IngestionEvent],
}

/// Process-wide exporter shared by all in-flight requests.
///
/// Events are buffered under a mutex and drained by [`TraceExporter::flush`].
/// Each flush is an independent network call; the only shared mutable state
/// is the buffer itself, so concurrent flushes from many requests are safe.
/// Backend failures are logged and swallowed: telemetry must never fail a
/// user-facing request.
pub struct TraceExporter {
    config: ExporterConfig,
    client: reqwest::Client,
    buffer: Mutex<Vec<IngestionEvent>>,
}

impl TraceExporter {
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Sampling decision for a new trace.
    pub fn sample(&self) -> bool {
        match self.config.sample_rate {
            Some(rate) => rand::random::<f64>() < rate,
            None => true,
        }
    }

    /// Buffers an event for the next flush.
    pub fn record(&self, event: IngestionEvent) {
        if self.config.debug {
            debug!(event = ?event, "buffered ingestion event");
        }
        let Ok(mut guard) = self.buffer.lock() else {
            warn!("failed to acquire exporter buffer lock");
            return;
        };
        guard.push(event);
    }

    /// Number of buffered, not-yet-flushed events.
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|g| g.len()).unwrap_or(0)
    }

    fn take_batch(&self) -> Vec<IngestionEvent> {
        let Ok(mut guard) = self.buffer.lock() else {
            return Vec::new();
        };
        std::mem::take(&mut *guard)
    }

    /// Drains the buffer and ships it to the backend.
    ///
    /// Infallible by contract: export errors are logged and dropped.
    pub async fn flush(&self) {
        let batch = self.take_batch();
        if batch.is_empty() {
            return;
        }

        let url = format!("{}/api/public/ingestion", self.config.host);
        let result = self
            .client
            .post(&url)
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&IngestionBatch { batch: &batch })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(events = batch.len(), "flushed telemetry batch");
            }
            Ok(resp) => {
                warn!(
                    status = resp.status().as_u16(),
                    events = batch.len(),
                    "telemetry backend rejected batch"
                );
            }
            Err(e) => {
                warn!(error = %e, events = batch.len(), "telemetry export failed");
            }
        }
    }

    /// Final flush on process shutdown.
    pub async fn shutdown(&self) {
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventKind;

    fn test_exporter(sample_rate: Option<f64>) -> TraceExporter {
        TraceExporter::new(ExporterConfig {
            public_key: "pk-test".into(),
            secret_key: "sk-test".into(),
            host: "http://127.0.0.1:9".into(),
            sample_rate,
            debug: false,
        })
    }

    #[test]
    fn test_record_buffers_events() {
        let exporter = test_exporter(None);
        assert_eq!(exporter.pending(), 0);

        exporter.record(IngestionEvent::new(
            EventKind::TraceCreate,
            serde_json::json!({ "id": "t1" }),
        ));
        assert_eq!(exporter.pending(), 1);

        let batch = exporter.take_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(exporter.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_with_empty_buffer_is_noop() {
        let exporter = test_exporter(None);
        // Must not attempt any network call; host above is unroutable.
        exporter.flush().await;
        assert_eq!(exporter.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_swallows_backend_failure() {
        let exporter = test_exporter(None);
        exporter.record(IngestionEvent::new(
            EventKind::TraceCreate,
            serde_json::json!({ "id": "t1" }),
        ));
        // Port 9 (discard) refuses the connection; flush must not panic
        // or error, and the batch is dropped rather than retried.
        exporter.flush().await;
        assert_eq!(exporter.pending(), 0);
    }

    #[test]
    fn test_sampling_bounds() {
        assert!(test_exporter(None).sample());
        assert!(test_exporter(Some(1.5)).sample());
        assert!(!test_exporter(Some(0.0)).sample());
    }
}
