//! Batch orchestrator: runs the generation step for every incomplete item of
//! a batch under a concurrency cap and records the results in the quota
//! tracker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use convoforge_core::{ConversationRecord, ForgeError, ForgeResult};
use convoforge_dedup::{infer_role, infer_style, Admission, QuotaTracker};
use convoforge_logging::{PipelineEvent, PipelineEventLogger};

use crate::completion::ConversationCompleter;

/// Category recorded for conversations that never called a tool.
pub const NO_TOOL_CATEGORY: &str = "no_tool";

/// The downstream step that turns a question record into a completed one.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, record: &ConversationRecord) -> ForgeResult<ConversationRecord>;
}

#[async_trait]
impl Generator for ConversationCompleter {
    async fn generate(&self, record: &ConversationRecord) -> ForgeResult<ConversationRecord> {
        self.complete(record).await
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub enable_parallel: bool,
    pub max_concurrent: usize,
    pub item_timeout: Duration,
    /// Sequential mode sleeps `inter_item_pause` after every `pause_every` items.
    pub inter_item_pause: Duration,
    pub pause_every: usize,
    /// Stripped from the called tool's name to get the quota category.
    pub tool_prefix: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_concurrent: 2,
            item_timeout: Duration::from_secs(30),
            inter_item_pause: Duration::from_secs(1),
            pause_every: 5,
            tool_prefix: "mcp__merlin_mcp_tool__".into(),
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Records to persist: pass-throughs plus newly admitted items, in input order.
    pub completed: Vec<ConversationRecord>,
    pub passed_through: usize,
    pub recorded: usize,
    /// Generated but dropped as a duplicate or over quota.
    pub discarded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Never started because the run was cancelled.
    pub unstarted: usize,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.recorded + self.discarded + self.failed
    }
}

/// Counts workers inside the generation step; keeps the peak.
#[derive(Debug, Default)]
pub struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    pub fn enter(self: &Arc<Self>) -> ActiveGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(self.clone())
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct ActiveGuard(Arc<ActivityGauge>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BatchOrchestrator {
    generator: Arc<dyn Generator>,
    tracker: Arc<Mutex<QuotaTracker>>,
    settings: OrchestratorSettings,
    gauge: Arc<ActivityGauge>,
    run_id: String,
}

impl BatchOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        tracker: Arc<Mutex<QuotaTracker>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            generator,
            tracker,
            settings,
            gauge: Arc::new(ActivityGauge::default()),
            run_id: String::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn gauge(&self) -> &Arc<ActivityGauge> {
        &self.gauge
    }

    pub fn tracker(&self) -> &Arc<Mutex<QuotaTracker>> {
        &self.tracker
    }

    /// Process one batch. `base_index` is the position of `items[0]` in the
    /// whole input and is only used for logging.
    ///
    /// Once `cancel` fires no further item is started. Items already in the
    /// generation step run to completion (bounded by the item timeout) and
    /// are settled, so every admitted record comes back in the outcome.
    pub async fn run_batch(
        &self,
        items: Vec<ConversationRecord>,
        base_index: usize,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut kept: Vec<(usize, ConversationRecord)> = Vec::new();
        let mut pending = Vec::new();

        for (offset, record) in items.into_iter().enumerate() {
            let index = base_index + offset;
            if record.conversations.is_empty() || record.user_question().is_none() {
                warn!(index, "Item has no question turn; skipping");
                outcome.skipped += 1;
                continue;
            }
            if record.is_complete() {
                debug!(index, "Item already complete; passing through");
                outcome.passed_through += 1;
                kept.push((index, record));
                continue;
            }
            pending.push((index, record));
        }

        if pending.is_empty() {
            info!(base_index, "Nothing to complete in this batch");
        } else if self.settings.enable_parallel && pending.len() > 1 {
            info!(
                items = pending.len(),
                max_concurrent = self.settings.max_concurrent,
                "Completing batch concurrently"
            );
            self.run_concurrent(pending, cancel, &mut outcome, &mut kept)
                .await;
        } else {
            info!(items = pending.len(), "Completing batch sequentially");
            self.run_sequential(pending, cancel, &mut outcome, &mut kept)
                .await;
        }

        kept.sort_by_key(|(index, _)| *index);
        outcome.completed = kept.into_iter().map(|(_, r)| r).collect();
        info!(
            recorded = outcome.recorded,
            passed_through = outcome.passed_through,
            discarded = outcome.discarded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            unstarted = outcome.unstarted,
            "Batch finished"
        );
        outcome
    }

    /// Permits are taken here, in input order, so a cancelled batch always
    /// leaves an unstarted suffix rather than gaps.
    async fn run_concurrent(
        &self,
        pending: Vec<(usize, ConversationRecord)>,
        cancel: &CancellationToken,
        outcome: &mut BatchOutcome,
        kept: &mut Vec<(usize, ConversationRecord)>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut join_set = JoinSet::new();
        let total = pending.len();

        for (n, (index, record)) in pending.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcome.unstarted = total - n;
                warn!(index, unstarted = outcome.unstarted, "Cancelled; not starting remaining items");
                break;
            };

            let generator = self.generator.clone();
            let gauge = self.gauge.clone();
            let timeout = self.settings.item_timeout;
            join_set.spawn(async move {
                let _permit = permit;
                let _active = gauge.enter();
                let result = generate_with_timeout(generator.as_ref(), &record, timeout).await;
                (index, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => self.settle(index, result, outcome, kept),
                Err(e) => {
                    error!(error = %e, "Worker task panicked");
                    outcome.failed += 1;
                }
            }
        }
    }

    async fn run_sequential(
        &self,
        pending: Vec<(usize, ConversationRecord)>,
        cancel: &CancellationToken,
        outcome: &mut BatchOutcome,
        kept: &mut Vec<(usize, ConversationRecord)>,
    ) {
        let total = pending.len();
        for (n, (index, record)) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.unstarted = total - n;
                warn!(index, unstarted = outcome.unstarted, "Cancelled; not starting remaining items");
                break;
            }
            let result = {
                let _active = self.gauge.enter();
                generate_with_timeout(self.generator.as_ref(), &record, self.settings.item_timeout)
                    .await
            };
            self.settle(index, result, outcome, kept);

            if self.settings.pause_every > 0 && (n + 1) % self.settings.pause_every == 0 {
                debug!(pause_ms = self.settings.inter_item_pause.as_millis() as u64, "Rate-limit pause");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.inter_item_pause) => {}
                }
            }
        }
    }

    /// Classify and record a finished item. Duplicates and over-quota items
    /// are dropped here, after the work was done.
    fn settle(
        &self,
        index: usize,
        result: ForgeResult<ConversationRecord>,
        outcome: &mut BatchOutcome,
        kept: &mut Vec<(usize, ConversationRecord)>,
    ) {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(index, error = %e, kind = e.kind(), "Item failed");
                PipelineEventLogger::log(
                    &self.run_id,
                    PipelineEvent::ItemFailed {
                        index,
                        error_msg: e.to_string(),
                    },
                );
                outcome.failed += 1;
                return;
            }
        };

        let category = self.category_of(&record);
        let question = record.user_question().unwrap_or_default();
        let role = infer_role(question);
        let style = infer_style(question);

        let admission = match self.tracker.lock() {
            Ok(mut tracker) => tracker.admit(&record, &category, Some(role), Some(style)),
            Err(_) => Err(anyhow::anyhow!("quota tracker lock poisoned")),
        };

        match admission {
            Ok(Admission::Recorded) => {
                debug!(index, category = %category, role = %role, style = %style, "Item recorded");
                PipelineEventLogger::log(
                    &self.run_id,
                    PipelineEvent::ItemCompleted { index, category },
                );
                outcome.recorded += 1;
                kept.push((index, record));
            }
            Ok(reason) => {
                info!(index, category = %category, reason = ?reason, "Discarding generated item");
                outcome.discarded += 1;
            }
            Err(e) => {
                error!(index, error = %e, "Failed to record item");
                PipelineEventLogger::log(
                    &self.run_id,
                    PipelineEvent::ItemFailed {
                        index,
                        error_msg: format!("{e:#}"),
                    },
                );
                outcome.failed += 1;
            }
        }
    }

    fn category_of(&self, record: &ConversationRecord) -> String {
        match record.first_tool_called() {
            Some(name) => name
                .strip_prefix(self.settings.tool_prefix.as_str())
                .unwrap_or(&name)
                .to_string(),
            None => NO_TOOL_CATEGORY.to_string(),
        }
    }
}

async fn generate_with_timeout(
    generator: &dyn Generator,
    record: &ConversationRecord,
    timeout: Duration,
) -> ForgeResult<ConversationRecord> {
    match tokio::time::timeout(timeout, generator.generate(record)).await {
        Ok(result) => result,
        Err(_) => Err(ForgeError::Timeout(format!(
            "item did not complete within {timeout:?}"
        ))),
    }
}
