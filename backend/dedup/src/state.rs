//! Persisted generation state.
//!
//! The used-signature and used-parameter sets only grow. The whole state is
//! written after every recorded item.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Keys of `used_parameters`.
pub const PARAM_ADDRESSES: &str = "addresses";
pub const PARAM_TX_HASHES: &str = "tx_hashes";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    /// Items recorded per category.
    #[serde(default)]
    pub generated_count: HashMap<String, u64>,

    /// Signatures of every recorded question.
    #[serde(default)]
    pub used_questions: BTreeSet<String>,

    /// Literal values already used, per parameter kind.
    #[serde(default)]
    pub used_parameters: HashMap<String, BTreeSet<String>>,

    #[serde(default)]
    pub role_count: HashMap<String, u64>,

    #[serde(default)]
    pub style_count: HashMap<String, u64>,

    /// Kept for state-file compatibility; not updated.
    #[serde(default)]
    pub question_patterns: HashMap<String, u64>,

    #[serde(default)]
    pub total_generated: u64,
}

impl GenerationState {
    /// Load from `path`; a missing file is a fresh state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No generation state yet; starting fresh");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read generation state: {}", path.display()))?;
        let state: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse generation state: {}", path.display()))?;
        info!(
            path = %path.display(),
            total = state.total_generated,
            signatures = state.used_questions.len(),
            "Loaded generation state"
        );
        Ok(state)
    }

    /// Write the whole state atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        convoforge_config::write_json_atomic_sync(self, path)
    }

    pub fn generated(&self, category: &str) -> u64 {
        self.generated_count.get(category).copied().unwrap_or(0)
    }

    pub fn has_signature(&self, signature: &str) -> bool {
        self.used_questions.contains(signature)
    }

    pub fn used(&self, kind: &str) -> usize {
        self.used_parameters.get(kind).map(BTreeSet::len).unwrap_or(0)
    }

    pub(crate) fn add_parameter(&mut self, kind: &str, value: String) {
        self.used_parameters
            .entry(kind.to_string())
            .or_default()
            .insert(value);
    }
}
