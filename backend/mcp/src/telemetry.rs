//! Per-tool call telemetry: recent call records and aggregated stats.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// A single tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool: String,
    pub duration_ms: u64,
    /// `success`, `error` (business failure) or the raised error kind.
    pub status: String,
    pub retries: u32,
    pub timestamp_secs: i64,
}

/// Aggregated telemetry for a tool.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub total_calls: u64,
    pub success_calls: u64,
    pub business_errors: u64,
    pub raised_errors: u64,
    pub total_retries: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl ToolStats {
    pub fn avg_duration_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_calls as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.success_calls as f64 / self.total_calls as f64
        }
    }
}

#[derive(Clone)]
pub struct CallTelemetry {
    records: Arc<RwLock<Vec<ToolCallRecord>>>,
    max_records: usize,
    stats: Arc<RwLock<HashMap<String, ToolStats>>>,
}

impl Default for CallTelemetry {
    fn default() -> Self {
        Self::new(512)
    }
}

impl CallTelemetry {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            max_records,
            stats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, rec: ToolCallRecord) {
        debug!(tool = %rec.tool, duration_ms = rec.duration_ms, status = %rec.status, "Tool call telemetry");

        {
            let mut stats = self.stats.write().await;
            let entry = stats.entry(rec.tool.clone()).or_default();
            entry.total_calls += 1;
            entry.total_duration_ms += rec.duration_ms;
            entry.total_retries += u64::from(rec.retries);
            entry.max_duration_ms = entry.max_duration_ms.max(rec.duration_ms);
            match rec.status.as_str() {
                "success" => entry.success_calls += 1,
                "error" => entry.business_errors += 1,
                _ => entry.raised_errors += 1,
            }
        }

        let mut records = self.records.write().await;
        records.push(rec);
        if records.len() > self.max_records {
            let excess = records.len() - self.max_records;
            records.drain(..excess);
        }
    }

    /// Most recent records first.
    pub async fn recent(&self, limit: usize) -> Vec<ToolCallRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> HashMap<String, ToolStats> {
        self.stats.read().await.clone()
    }
}

/// Wall-clock timer for a call.
pub struct CallTimer {
    start: Instant,
}

impl CallTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
