//! `convoforge-config`: runtime configuration for the ConvoForge pipeline.
//!
//! Provides:
//! - Typed config schema (LLM API, tool service, quotas, completion run, logging)
//! - YAML/JSON loading and atomic JSON file writes
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation with errors and warnings

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::{apply_all_defaults, default_category_ratios};
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{
    default_config_path, load_raw_config, read_json_file, write_json_atomic,
    write_json_atomic_sync,
};
pub use schema::{
    ApiConfig, CompletionConfig, ForgeConfig, GenerationConfig, LoggingConfig, McpConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use std::path::Path;

/// Load, substitute env vars, apply defaults and validate a config file.
///
/// Validation problems are logged; the caller decides whether an invalid
/// report is fatal (see [`load_validated`]).
pub async fn load_and_prepare(path: &Path) -> Result<ForgeConfig> {
    let (config, _report) = load_with_report(path).await?;
    Ok(config)
}

/// Like [`load_and_prepare`] but fails when validation reports errors.
pub async fn load_validated(path: &Path) -> Result<ForgeConfig> {
    let (config, report) = load_with_report(path).await?;
    if !report.is_valid() {
        let joined = report
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("Invalid configuration: {joined}");
    }
    Ok(config)
}

async fn load_with_report(path: &Path) -> Result<(ForgeConfig, ValidationReport)> {
    let raw = load_raw_config(path).await?;

    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;

    let config: ForgeConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }

    Ok((config, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_file_with_defaults_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convoforge.yaml");
        std::fs::write(
            &path,
            "api:\n  apiKey: sk-file\ncompletion:\n  maxConcurrent: 4\n",
        )
        .unwrap();

        let cfg = load_validated(&path).await.unwrap();
        assert_eq!(cfg.api().api_key.as_deref(), Some("sk-file"));
        assert_eq!(cfg.completion().max_concurrent(), 4);
        assert_eq!(cfg.completion.as_ref().unwrap().pause_every, Some(5));
        assert_eq!(cfg.mcp().tool_prefix(), "mcp__merlin_mcp_tool__");
    }

    #[tokio::test]
    async fn invalid_ratios_fail_validated_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "api:\n  apiKey: sk\ngeneration:\n  categoryRatios:\n    a: 0.9\n",
        )
        .unwrap();
        let err = load_validated(&path).await.unwrap_err();
        assert!(err.to_string().contains("categoryRatios"));
    }
}
