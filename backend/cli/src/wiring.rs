//! Maps the loaded config onto the settings structs of the library crates.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use convoforge_config::{ApiConfig, CompletionConfig, ForgeConfig, GenerationConfig, McpConfig};
use convoforge_core::RetryPolicy;
use convoforge_dedup::QuotaTracker;
use convoforge_mcp::SessionSettings;
use convoforge_pipeline::{
    CheckpointManager, CompletionSettings, OrchestratorSettings, RunnerSettings,
};
use convoforge_planner::OpenAiCompatProvider;

const LLM_TIMEOUT_BACKOFF_MS: u64 = 10_000;
const LLM_REQUEST_BACKOFF_MS: u64 = 5_000;

pub fn session_settings(mcp: &McpConfig) -> SessionSettings {
    SessionSettings {
        sse_path: mcp.sse_path().to_string(),
        tool_prefix: mcp.tool_prefix().to_string(),
        max_retries: mcp.max_retries(),
        request_timeout: Duration::from_secs(mcp.request_timeout_secs()),
        connect_timeout: Duration::from_secs(mcp.connect_timeout_secs()),
        ..SessionSettings::new(mcp.base_url())
    }
}

pub fn llm_provider(api: &ApiConfig) -> Result<OpenAiCompatProvider> {
    let key = api
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .context("No API key configured (set api.apiKey or DEEPSEEK_API_KEY)")?;
    Ok(OpenAiCompatProvider::new(key)
        .with_base_url(api.base_url())
        .with_timeout(Duration::from_secs(api.timeout_secs())))
}

pub fn completion_settings(config: &ForgeConfig) -> CompletionSettings {
    let api = config.api();
    let completion = config.completion();
    // maxRetries counts attempts, the first one included.
    let retries = api.max_retries().saturating_sub(1);
    CompletionSettings {
        tool_prefix: config.mcp().tool_prefix().to_string(),
        max_tool_rounds: completion.max_tool_rounds(),
        max_tokens: api.max_tokens(),
        temperature: api.temperature(),
        timeout_retry: RetryPolicy::linear(retries, LLM_TIMEOUT_BACKOFF_MS),
        request_retry: RetryPolicy::linear(retries, LLM_REQUEST_BACKOFF_MS),
        ..CompletionSettings::new(api.model(), completion.system_prompt())
    }
}

pub fn orchestrator_settings(config: &ForgeConfig) -> OrchestratorSettings {
    let completion = config.completion();
    OrchestratorSettings {
        enable_parallel: completion.enable_parallel(),
        max_concurrent: completion.max_concurrent(),
        item_timeout: Duration::from_secs(completion.item_timeout_secs()),
        inter_item_pause: Duration::from_millis(completion.inter_item_pause_ms()),
        pause_every: completion.pause_every(),
        tool_prefix: config.mcp().tool_prefix().to_string(),
    }
}

pub fn runner_settings(completion: &CompletionConfig, batch_size: Option<usize>) -> RunnerSettings {
    RunnerSettings {
        batch_size: batch_size.unwrap_or_else(|| completion.batch_size()),
        inter_batch_pause: Duration::from_millis(completion.inter_batch_pause_ms()),
    }
}

pub fn checkpoint_manager(completion: &CompletionConfig) -> CheckpointManager {
    CheckpointManager::new(completion.checkpoint_dir(), completion.checkpoint_prefix())
}

pub fn open_tracker(generation: &GenerationConfig) -> Result<QuotaTracker> {
    let path = Path::new(generation.state_file());
    QuotaTracker::open(
        path,
        generation.total_conversations(),
        &generation.category_ratios(),
    )
    .with_context(|| format!("Failed to open generation state {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoforge_config::apply_all_defaults;

    #[test]
    fn defaults_map_onto_settings() {
        let config = apply_all_defaults(ForgeConfig::default());

        let session = session_settings(&config.mcp());
        assert_eq!(session.sse_url(), "https://mcp.merlinchain.io/sse");
        assert_eq!(session.max_retries, 2);
        assert_eq!(session.request_timeout, Duration::from_secs(30));

        let completion = completion_settings(&config);
        assert_eq!(completion.model, "deepseek-chat");
        assert_eq!(completion.max_tool_rounds, 6);
        assert_eq!(completion.timeout_retry.max_retries, 2);
        assert_eq!(completion.timeout_retry.delay_for(2), Duration::from_secs(20));

        let orchestrator = orchestrator_settings(&config);
        assert!(orchestrator.enable_parallel);
        assert_eq!(orchestrator.max_concurrent, 2);
        assert_eq!(orchestrator.tool_prefix, "mcp__merlin_mcp_tool__");
    }

    #[test]
    fn batch_size_flag_overrides_config() {
        let config = apply_all_defaults(ForgeConfig::default());
        assert_eq!(runner_settings(&config.completion(), None).batch_size, 1);
        assert_eq!(runner_settings(&config.completion(), Some(8)).batch_size, 8);
    }

    #[test]
    fn tracker_persists_next_to_configured_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = apply_all_defaults(ForgeConfig::default());
        let state = dir.path().join("state.json");
        if let Some(generation) = config.generation.as_mut() {
            generation.state_file = Some(state.display().to_string());
            generation.total_conversations = Some(10);
        }

        let tracker = open_tracker(&config.generation()).unwrap();
        assert_eq!(tracker.plan().total(), 10);
        assert_eq!(tracker.state().total_generated, 0);
    }
}
