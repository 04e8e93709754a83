//! Batch runner: slices the input from the start offset, runs each batch
//! through the orchestrator and checkpoints it.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, warn};

use convoforge_core::ConversationRecord;
use convoforge_logging::{PipelineEvent, PipelineEventLogger};

use crate::orchestrator::BatchOrchestrator;
use crate::run_context::RunContext;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub batch_size: usize,
    pub inter_batch_pause: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: 1,
            inter_batch_pause: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_items: usize,
    pub start_offset: usize,
    pub batches_run: usize,
    /// Items the batches covered, skipped and failed ones included.
    pub processed: usize,
    pub recorded: usize,
    pub passed_through: usize,
    pub discarded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        (self.recorded + self.passed_through) as f64 / self.processed as f64 * 100.0
    }
}

pub struct BatchRunner {
    orchestrator: BatchOrchestrator,
    settings: RunnerSettings,
}

impl BatchRunner {
    pub fn new(orchestrator: BatchOrchestrator, settings: RunnerSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    /// Process `items[ctx.start_offset()..]` batch by batch.
    ///
    /// On cancellation the batch in flight stops starting items, and whatever
    /// it admitted is checkpointed before the loop ends. A batch whose
    /// checkpoint cannot be written is rolled back in the quota tracker, so a
    /// resumed run can produce those items again.
    pub async fn run(&self, items: &[ConversationRecord], ctx: &RunContext) -> Result<RunSummary> {
        let start = ctx.start_offset();
        let mut summary = RunSummary {
            total_items: items.len(),
            start_offset: start,
            ..RunSummary::default()
        };
        if start >= items.len() {
            info!(start, total = items.len(), "Start offset is past the input; nothing to do");
            return Ok(summary);
        }

        let batch_size = self.settings.batch_size.max(1);
        let remaining = &items[start..];
        let total_batches = remaining.len().div_ceil(batch_size);
        let cancel = ctx.cancellation();
        info!(
            items = remaining.len(),
            start,
            batch_size,
            total_batches,
            "Starting run"
        );

        for (n, chunk) in remaining.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!(batch = n + 1, "Run cancelled before batch");
                summary.interrupted = true;
                break;
            }

            let batch_index = n + 1;
            let start_index = start + n * batch_size;
            info!(batch = batch_index, total_batches, start_index, "Processing batch");

            let before = self
                .orchestrator
                .tracker()
                .lock()
                .map_err(|_| anyhow!("quota tracker lock poisoned"))?
                .snapshot();
            let outcome = self
                .orchestrator
                .run_batch(chunk.to_vec(), start_index, &cancel)
                .await;

            if !outcome.completed.is_empty() {
                let written = ctx
                    .checkpoints()
                    .persist_batch(batch_index, start, start_index, &outcome.completed)
                    .await;
                let path = match written {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(batch = batch_index, error = %e, "Checkpoint failed; rolling back batch");
                        let mut tracker = self
                            .orchestrator
                            .tracker()
                            .lock()
                            .map_err(|_| anyhow!("quota tracker lock poisoned"))?;
                        tracker.restore(before)?;
                        return Err(e);
                    }
                };
                PipelineEventLogger::log(
                    ctx.run_id(),
                    PipelineEvent::CheckpointWritten {
                        path: path.display().to_string(),
                        records: outcome.completed.len(),
                    },
                );
            }

            summary.batches_run += 1;
            summary.processed += chunk.len() - outcome.unstarted;
            summary.recorded += outcome.recorded;
            summary.passed_through += outcome.passed_through;
            summary.discarded += outcome.discarded;
            summary.skipped += outcome.skipped;
            summary.failed += outcome.failed;

            info!(
                processed = summary.processed,
                of = remaining.len(),
                recorded = summary.recorded,
                failed = summary.failed,
                success_rate = %format!("{:.1}%", summary.success_rate()),
                "Progress"
            );

            if cancel.is_cancelled() {
                if outcome.unstarted > 0 || batch_index < total_batches {
                    warn!(batch = batch_index, "Run cancelled after checkpointing batch");
                    summary.interrupted = true;
                }
                break;
            }

            if batch_index < total_batches && !self.settings.inter_batch_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.inter_batch_pause) => {}
                }
            }
        }

        Ok(summary)
    }
}
