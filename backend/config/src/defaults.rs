//! Config defaults: applies default values to parsed config.

use indexmap::IndexMap;

use crate::schema::{
    ApiConfig, CompletionConfig, ForgeConfig, GenerationConfig, LoggingConfig, McpConfig,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_API_MODEL: &str = "deepseek-chat";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_API_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_API_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_API_MAX_RETRIES: u32 = 3;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV_VAR: &str = "DEEPSEEK_API_KEY";

pub const DEFAULT_MCP_BASE_URL: &str = "https://mcp.merlinchain.io";
pub const DEFAULT_MCP_SSE_PATH: &str = "/sse";
pub const DEFAULT_MCP_TOOL_PREFIX: &str = "mcp__merlin_mcp_tool__";
pub const DEFAULT_MCP_MAX_RETRIES: u32 = 2;
pub const DEFAULT_MCP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MCP_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_TOTAL_CONVERSATIONS: u64 = 6000;
pub const DEFAULT_GENERATION_BATCH_SIZE: usize = 50;
pub const DEFAULT_STATE_FILE: &str = "generation_state.json";

pub const DEFAULT_MAX_CONCURRENT: usize = 2;
pub const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COMPLETION_BATCH_SIZE: usize = 1;
pub const DEFAULT_QUESTION_FILE: &str = "function_calling_dataset_smart.json";
pub const DEFAULT_OUTPUT_FILE: &str = "function_calling_dataset_completed.json";
pub const DEFAULT_CHECKPOINT_DIR: &str = ".";
pub const DEFAULT_CHECKPOINT_PREFIX: &str = "temp_complete_batch";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;
pub const DEFAULT_INTER_ITEM_PAUSE_MS: u64 = 1_000;
pub const DEFAULT_PAUSE_EVERY: usize = 5;
pub const DEFAULT_INTER_BATCH_PAUSE_MS: u64 = 3_000;
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个专业的Merlin Chain助手，擅长使用各种MCP工具帮助用户查询链上数据。";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default per-tool share of generated conversations.
pub fn default_category_ratios() -> IndexMap<String, f64> {
    [
        ("get_address_details_by_address", 0.10),
        ("get_token_info_by_address", 0.08),
        ("list_address_latest_txs", 0.08),
        ("get_tx_by_hash", 0.07),
        ("search_chain_data", 0.07),
        ("query_asset_value_by_address", 0.05),
        ("query_token_holding_by_address", 0.05),
        ("get_block_by_number", 0.05),
        ("list_latest_blocks", 0.05),
        ("get_token_priceChange_by_address", 0.05),
        ("list_address_latest_token_transfers", 0.05),
        ("get_holders_by_address", 0.05),
        ("batch_get_tx_by_hashes", 0.03),
        ("list_block_txs", 0.03),
        ("get_native_price_info_by_address", 0.03),
        ("get_token_onChain_data_by_address", 0.03),
        ("list_recent_txs_num_by_address", 0.03),
        ("get_block_by_hash", 0.03),
        ("list_latest_txs", 0.04),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: ForgeConfig) -> ForgeConfig {
    let config = apply_api_defaults(config);
    let config = apply_mcp_defaults(config);
    let config = apply_generation_defaults(config);
    let config = apply_completion_defaults(config);
    apply_logging_defaults(config)
}

/// Fill API endpoint settings; the key falls back to the environment.
fn apply_api_defaults(mut config: ForgeConfig) -> ForgeConfig {
    let api = config.api.get_or_insert_with(ApiConfig::default);
    api.base_url.get_or_insert_with(|| DEFAULT_API_BASE_URL.to_string());
    api.model.get_or_insert_with(|| DEFAULT_API_MODEL.to_string());
    api.timeout_secs.get_or_insert(DEFAULT_API_TIMEOUT_SECS);
    api.temperature.get_or_insert(DEFAULT_API_TEMPERATURE);
    api.max_tokens.get_or_insert(DEFAULT_API_MAX_TOKENS);
    api.max_retries.get_or_insert(DEFAULT_API_MAX_RETRIES);
    if api.api_key.as_deref().map(str::is_empty).unwrap_or(true) {
        api.api_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| !k.is_empty());
    }
    config
}

fn apply_mcp_defaults(mut config: ForgeConfig) -> ForgeConfig {
    let mcp = config.mcp.get_or_insert_with(McpConfig::default);
    mcp.base_url.get_or_insert_with(|| DEFAULT_MCP_BASE_URL.to_string());
    mcp.sse_path.get_or_insert_with(|| DEFAULT_MCP_SSE_PATH.to_string());
    mcp.tool_prefix.get_or_insert_with(|| DEFAULT_MCP_TOOL_PREFIX.to_string());
    mcp.max_retries.get_or_insert(DEFAULT_MCP_MAX_RETRIES);
    mcp.request_timeout_secs.get_or_insert(DEFAULT_MCP_REQUEST_TIMEOUT_SECS);
    mcp.connect_timeout_secs.get_or_insert(DEFAULT_MCP_CONNECT_TIMEOUT_SECS);
    config
}

fn apply_generation_defaults(mut config: ForgeConfig) -> ForgeConfig {
    let generation = config.generation.get_or_insert_with(GenerationConfig::default);
    generation.total_conversations.get_or_insert(DEFAULT_TOTAL_CONVERSATIONS);
    generation.batch_size.get_or_insert(DEFAULT_GENERATION_BATCH_SIZE);
    generation.state_file.get_or_insert_with(|| DEFAULT_STATE_FILE.to_string());
    generation.category_ratios.get_or_insert_with(default_category_ratios);
    config
}

fn apply_completion_defaults(mut config: ForgeConfig) -> ForgeConfig {
    let c = config.completion.get_or_insert_with(CompletionConfig::default);
    c.enable_parallel.get_or_insert(true);
    c.max_concurrent.get_or_insert(DEFAULT_MAX_CONCURRENT);
    c.item_timeout_secs.get_or_insert(DEFAULT_ITEM_TIMEOUT_SECS);
    c.batch_size.get_or_insert(DEFAULT_COMPLETION_BATCH_SIZE);
    c.question_file.get_or_insert_with(|| DEFAULT_QUESTION_FILE.to_string());
    c.output_file.get_or_insert_with(|| DEFAULT_OUTPUT_FILE.to_string());
    c.checkpoint_dir.get_or_insert_with(|| DEFAULT_CHECKPOINT_DIR.to_string());
    c.checkpoint_prefix.get_or_insert_with(|| DEFAULT_CHECKPOINT_PREFIX.to_string());
    c.max_tool_rounds.get_or_insert(DEFAULT_MAX_TOOL_ROUNDS);
    c.inter_item_pause_ms.get_or_insert(DEFAULT_INTER_ITEM_PAUSE_MS);
    c.pause_every.get_or_insert(DEFAULT_PAUSE_EVERY);
    c.inter_batch_pause_ms.get_or_insert(DEFAULT_INTER_BATCH_PAUSE_MS);
    c.system_prompt.get_or_insert_with(|| DEFAULT_SYSTEM_PROMPT.to_string());
    config
}

fn apply_logging_defaults(mut config: ForgeConfig) -> ForgeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir.get_or_insert_with(|| DEFAULT_LOG_DIR.to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ratios_sum_to_one() {
        let sum: f64 = default_category_ratios().values().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
    }

    #[test]
    fn fills_every_section() {
        let cfg = apply_all_defaults(ForgeConfig::default());
        assert_eq!(cfg.mcp.unwrap().max_retries, Some(DEFAULT_MCP_MAX_RETRIES));
        assert_eq!(
            cfg.completion.unwrap().checkpoint_prefix.as_deref(),
            Some(DEFAULT_CHECKPOINT_PREFIX)
        );
        assert_eq!(cfg.logging.unwrap().dir.as_deref(), Some("logs"));
    }

    #[test]
    fn does_not_override_user_values() {
        let mut cfg = ForgeConfig::default();
        cfg.completion = Some(CompletionConfig {
            max_concurrent: Some(7),
            ..Default::default()
        });
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.completion.unwrap().max_concurrent, Some(7));
    }
}
