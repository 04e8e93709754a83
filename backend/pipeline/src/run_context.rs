//! Run lifecycle: cancellation, signal handling and the one-time shutdown
//! that merges checkpoints and releases the tool session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use convoforge_core::ToolInvoker;
use convoforge_logging::{PipelineEvent, PipelineEventLogger};

use crate::checkpoint::{CheckpointManager, MergeReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Completed,
    Interrupted(String),
    Failed(String),
}

impl ShutdownReason {
    fn label(&self) -> &str {
        match self {
            ShutdownReason::Completed => "completed",
            ShutdownReason::Interrupted(reason) | ShutdownReason::Failed(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub merge: MergeReport,
    /// Where a follow-up run should start.
    pub resume_offset: usize,
}

pub struct RunContext {
    run_id: String,
    start_offset: usize,
    output: PathBuf,
    checkpoints: CheckpointManager,
    tools: Arc<dyn ToolInvoker>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
    signal_task: Option<JoinHandle<()>>,
}

impl RunContext {
    pub fn new(
        start_offset: usize,
        output: impl Into<PathBuf>,
        checkpoints: CheckpointManager,
        tools: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            start_offset,
            output: output.into(),
            checkpoints,
            tools,
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
            signal_task: None,
        }
    }

    /// Cancel the run on Ctrl-C or SIGTERM.
    pub fn with_signal_handlers(mut self) -> Self {
        let cancel = self.cancel.clone();
        self.signal_task = Some(tokio::spawn(async move {
            let reason = wait_for_signal().await;
            warn!(signal = reason, "Interrupt received; stopping after the current step");
            cancel.cancel();
        }));
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Merge artifacts on disk into the output, report the resume offset and
    /// release the tool session.
    ///
    /// Runs once; later calls return `Ok(None)`. The session is released even
    /// when the merge fails.
    pub async fn shutdown(&self, reason: ShutdownReason) -> Result<Option<ShutdownReport>> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        if let Some(task) = &self.signal_task {
            task.abort();
        }
        info!(run_id = %self.run_id, reason = reason.label(), "Shutting down run");

        let merged = self.checkpoints.merge_all(&self.output).await;
        self.tools.release().await;

        let merge = match merged {
            Ok(merge) => merge,
            Err(e) => {
                error!(error = %e, "Checkpoint merge failed; artifacts left on disk");
                return Err(e);
            }
        };

        let resume_offset = self.start_offset + merge.added;
        if !matches!(reason, ShutdownReason::Completed) {
            PipelineEventLogger::log(
                &self.run_id,
                PipelineEvent::Interrupted {
                    reason: reason.label().to_string(),
                    merged_records: merge.added,
                    resume_offset,
                },
            );
            warn!(
                resume_offset,
                "Run stopped early; resume with --start-index {resume_offset}"
            );
        }
        info!(
            output = %self.output.display(),
            total = merge.total,
            added = merge.added,
            "Output saved"
        );

        Ok(Some(ShutdownReport {
            reason,
            merge,
            resume_offset,
        }))
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM; Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}
