//! The ConvoForge pipeline: completes question records through an LLM and
//! the tool service, under a concurrency cap, with per-batch checkpoints and
//! resumable shutdown.

pub mod checkpoint;
pub mod completion;
pub mod orchestrator;
pub mod run_context;
pub mod runner;

pub use checkpoint::{ArtifactKey, CheckpointManager, MergeReport};
pub use completion::{CompletionSettings, ConversationCompleter, ROUND_LIMIT_REPLY};
pub use orchestrator::{
    ActivityGauge, BatchOrchestrator, BatchOutcome, Generator, OrchestratorSettings,
    NO_TOOL_CATEGORY,
};
pub use run_context::{RunContext, ShutdownReason, ShutdownReport};
pub use runner::{BatchRunner, RunSummary, RunnerSettings};
