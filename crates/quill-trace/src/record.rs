//! Ingestion event types for the telemetry backend.

use quill_core::NormalizedUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Status of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    /// Request is still in flight.
    Running,
    /// Request completed and the generation finalized.
    Success,
    /// Request or model call failed.
    Error,
    /// Client went away before the completion event fired.
    Abandoned,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Running => "running",
            TraceStatus::Success => "success",
            TraceStatus::Error => "error",
            TraceStatus::Abandoned => "abandoned",
        }
    }
}

/// Kind of an ingestion event, matching the backend's batch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TraceCreate,
    TraceUpdate,
    GenerationCreate,
    GenerationUpdate,
}

/// One unit in an ingestion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    /// Unique event id (idempotency key on the backend).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub body: Value,
}

impl IngestionEvent {
    pub fn new(kind: EventKind, body: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp: now_ms(),
            body,
        }
    }
}

/// Body of a trace-create / trace-update event.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TraceStatus>,
}

/// Body of a generation-create / generation-update event.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBody {
    pub id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<NormalizedUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Severity level; set to `"ERROR"` on failed generations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
