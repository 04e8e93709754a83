//! Structured logging for the ConvoForge pipeline.
//!
//! Console + rolling NDJSON file output, secret redaction, and the pipeline
//! event log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, PipelineEvent, PipelineEventLogger, EVENT_TARGET};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
