//! ConvoForge runtime configuration schema.
//!
//! Every section and field is optional on disk; `apply_all_defaults` fills the
//! gaps and the accessor methods fall back to the same defaults, so callers
//! never need to unwrap.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeConfig {
    /// LLM endpoint used by the conversation completer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiConfig>,

    /// Remote tool service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpConfig>,

    /// Quota plan and generation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    /// Batch completion run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl ForgeConfig {
    pub fn api(&self) -> ApiConfig {
        self.api.clone().unwrap_or_default()
    }

    pub fn mcp(&self) -> McpConfig {
        self.mcp.clone().unwrap_or_default()
    }

    pub fn generation(&self) -> GenerationConfig {
        self.generation.clone().unwrap_or_default()
    }

    pub fn completion(&self) -> CompletionConfig {
        self.completion.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// LLM API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Attempts per LLM call, including the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ApiConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_API_MODEL)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_API_TIMEOUT_SECS)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_API_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_API_MAX_TOKENS)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_API_MAX_RETRIES)
    }
}

// ---------------------------------------------------------------------------
// Tool service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Path of the push-channel subscription, relative to `baseUrl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse_path: Option<String>,

    /// Namespace prefix the LLM sees in front of every tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl McpConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_MCP_BASE_URL)
    }

    pub fn sse_path(&self) -> &str {
        self.sse_path.as_deref().unwrap_or(DEFAULT_MCP_SSE_PATH)
    }

    pub fn tool_prefix(&self) -> &str {
        self.tool_prefix.as_deref().unwrap_or(DEFAULT_MCP_TOOL_PREFIX)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MCP_MAX_RETRIES)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(DEFAULT_MCP_REQUEST_TIMEOUT_SECS)
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs.unwrap_or(DEFAULT_MCP_CONNECT_TIMEOUT_SECS)
    }
}

// ---------------------------------------------------------------------------
// Generation quotas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_conversations: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// JSON file holding the persisted generation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,

    /// Share of the total per tool. Order matters: the rounding remainder
    /// goes to the first entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_ratios: Option<IndexMap<String, f64>>,
}

impl GenerationConfig {
    pub fn total_conversations(&self) -> u64 {
        self.total_conversations.unwrap_or(DEFAULT_TOTAL_CONVERSATIONS)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_GENERATION_BATCH_SIZE)
    }

    pub fn state_file(&self) -> &str {
        self.state_file.as_deref().unwrap_or(DEFAULT_STATE_FILE)
    }

    pub fn category_ratios(&self) -> IndexMap<String, f64> {
        self.category_ratios
            .clone()
            .unwrap_or_else(default_category_ratios)
    }
}

// ---------------------------------------------------------------------------
// Completion run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_parallel: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    /// Per-item timeout applied around the whole completion of one record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_rounds: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_item_pause_ms: Option<u64>,

    /// Sequential mode pauses after every this many items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_every: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_batch_pause_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl CompletionConfig {
    pub fn enable_parallel(&self) -> bool {
        self.enable_parallel.unwrap_or(true)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)
    }

    pub fn item_timeout_secs(&self) -> u64 {
        self.item_timeout_secs.unwrap_or(DEFAULT_ITEM_TIMEOUT_SECS)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_COMPLETION_BATCH_SIZE)
    }

    pub fn question_file(&self) -> &str {
        self.question_file.as_deref().unwrap_or(DEFAULT_QUESTION_FILE)
    }

    pub fn output_file(&self) -> &str {
        self.output_file.as_deref().unwrap_or(DEFAULT_OUTPUT_FILE)
    }

    pub fn checkpoint_dir(&self) -> &str {
        self.checkpoint_dir.as_deref().unwrap_or(DEFAULT_CHECKPOINT_DIR)
    }

    pub fn checkpoint_prefix(&self) -> &str {
        self.checkpoint_prefix
            .as_deref()
            .unwrap_or(DEFAULT_CHECKPOINT_PREFIX)
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    pub fn inter_item_pause_ms(&self) -> u64 {
        self.inter_item_pause_ms.unwrap_or(DEFAULT_INTER_ITEM_PAUSE_MS)
    }

    pub fn pause_every(&self) -> usize {
        self.pause_every.unwrap_or(DEFAULT_PAUSE_EVERY)
    }

    pub fn inter_batch_pause_ms(&self) -> u64 {
        self.inter_batch_pause_ms.unwrap_or(DEFAULT_INTER_BATCH_PAUSE_MS)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn dir(&self) -> &str {
        self.dir.as_deref().unwrap_or(DEFAULT_LOG_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_yaml() {
        let yaml = r#"
mcp:
  baseUrl: http://127.0.0.1:9000
  maxRetries: 4
completion:
  enableParallel: false
  maxConcurrent: 8
generation:
  categoryRatios:
    get_tx_by_hash: 0.5
    list_latest_blocks: 0.5
"#;
        let cfg: ForgeConfig = serde_yaml::from_str(yaml).unwrap();
        let mcp = cfg.mcp();
        assert_eq!(mcp.base_url(), "http://127.0.0.1:9000");
        assert_eq!(mcp.max_retries(), 4);
        assert_eq!(mcp.sse_path(), "/sse");
        assert!(!cfg.completion().enable_parallel());
        assert_eq!(cfg.completion().max_concurrent(), 8);

        let ratios = cfg.generation().category_ratios();
        assert_eq!(
            ratios.keys().collect::<Vec<_>>(),
            vec!["get_tx_by_hash", "list_latest_blocks"]
        );
    }

    #[test]
    fn accessors_fall_back_to_defaults() {
        let cfg = ForgeConfig::default();
        assert_eq!(cfg.api().base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(cfg.completion().max_tool_rounds(), 6);
        assert_eq!(cfg.generation().category_ratios().len(), 19);
    }
}
