//! Pipeline Event Logger
//!
//! Structured run events (tool calls, item outcomes, checkpoints, interruption)
//! emitted under [`EVENT_TARGET`]. They are written to the NDJSON file only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

/// `tracing` target of every pipeline event.
pub const EVENT_TARGET: &str = "pipeline_events";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    ToolCall {
        tool_name: String,
        arguments_json: String,
        status: String,
        latency_ms: u64,
    },
    ItemCompleted {
        index: usize,
        category: String,
    },
    ItemFailed {
        index: usize,
        error_msg: String,
    },
    CheckpointWritten {
        path: String,
        records: usize,
    },
    Interrupted {
        reason: String,
        merged_records: usize,
        resume_offset: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

pub struct PipelineEventLogger;

impl PipelineEventLogger {
    /// Redact free-text fields and emit the event.
    pub fn log(run_id: &str, mut event: PipelineEvent) {
        match &mut event {
            PipelineEvent::ToolCall { arguments_json, .. } => {
                *arguments_json = redact_sensitive_data(arguments_json);
            }
            PipelineEvent::ItemFailed { error_msg, .. } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            _ => {}
        }

        let entry = EventLogEntry {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            event,
        };

        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: EVENT_TARGET, event = %json, "Pipeline event");
    }
}
