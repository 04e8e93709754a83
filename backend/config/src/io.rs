//! Config and JSON data file read/write.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "convoforge.yaml";

/// Resolve the config file location.
/// Priority: `CONVOFORGE_CONFIG` env > `./convoforge.yaml` > `~/.convoforge/convoforge.yaml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("CONVOFORGE_CONFIG") {
        return PathBuf::from(path);
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    dirs::home_dir()
        .map(|home| home.join(".convoforge").join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}

/// Read a config file into a raw value tree.
///
/// YAML is parsed, so JSON files load as well. A missing file yields an empty
/// object (first run).
pub async fn load_raw_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

/// Read a JSON data file. Returns `None` if the file does not exist.
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse JSON at {}", path.display()))?;
    Ok(Some(value))
}

/// Write a JSON data file atomically (write to temp file, rename).
pub async fn write_json_atomic<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(value).context("Failed to serialize JSON")?;

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    debug!(path = %path.display(), bytes = json.len(), "Wrote JSON file");
    Ok(())
}

/// Synchronous variant of [`write_json_atomic`] for callers that must
/// persist inside a non-async critical section.
pub fn write_json_atomic_sync<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize JSON")?;
    let tmp_path = temp_path_for(path);
    std::fs::write(&tmp_path, &json)
        .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_config_is_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let v = load_raw_config(&dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(v, json!({}));
    }

    #[tokio::test]
    async fn json_config_parses_as_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, r#"{"mcp": {"maxRetries": 5}}"#).unwrap();
        let v = load_raw_config(&path).await.unwrap();
        assert_eq!(v["mcp"]["maxRetries"], 5);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json_atomic(&json!([1, 2, 3]), &path).await.unwrap();
        let back: Option<Vec<u32>> = read_json_file(&path).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(!dir.path().join("nested").join("out.json.tmp").exists());
    }
}
