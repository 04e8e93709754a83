//! Per-batch checkpoint artifacts and the merge that folds them into the
//! output file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use convoforge_config::io::{read_json_file, write_json_atomic};
use convoforge_core::ConversationRecord;
use convoforge_dedup::signature_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub source_offset: usize,
    pub batch_index: usize,
    pub start_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records already in the output file.
    pub existing: usize,
    pub artifacts: usize,
    /// Unique records the artifacts contributed.
    pub added: usize,
    /// Records dropped as signature duplicates.
    pub duplicates: usize,
    /// Records in the output after the merge.
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    prefix: String,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, key: ArtifactKey) -> PathBuf {
        self.dir.join(format!(
            "{}_o{}_b{}_s{}.json",
            self.prefix, key.source_offset, key.batch_index, key.start_index
        ))
    }

    /// Parse an artifact file name back into its key.
    pub fn parse_artifact_name(&self, file_name: &str) -> Option<ArtifactKey> {
        let rest = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix("_o")?
            .strip_suffix(".json")?;
        let (offset, rest) = rest.split_once("_b")?;
        let (batch, start) = rest.split_once("_s")?;
        Some(ArtifactKey {
            source_offset: offset.parse().ok()?,
            batch_index: batch.parse().ok()?,
            start_index: start.parse().ok()?,
        })
    }

    /// Write one batch's records to its artifact.
    pub async fn persist_batch(
        &self,
        batch_index: usize,
        source_offset: usize,
        start_index: usize,
        records: &[ConversationRecord],
    ) -> Result<PathBuf> {
        let path = self.artifact_path(ArtifactKey {
            source_offset,
            batch_index,
            start_index,
        });
        write_json_atomic(records, &path).await?;
        info!(path = %path.display(), records = records.len(), "Checkpoint written");
        Ok(path)
    }

    /// Artifacts currently on disk, ordered by key.
    pub async fn list_artifacts(&self) -> Result<Vec<(ArtifactKey, PathBuf)>> {
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list {}", self.dir.display()))
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| self.parse_artifact_name(n)) else {
                continue;
            };
            found.push((key, entry.path()));
        }
        found.sort_by_key(|(key, _)| *key);
        Ok(found)
    }

    /// Fold every artifact into `output`.
    ///
    /// Existing output comes first, then artifacts in key order; duplicates
    /// by question signature keep the first occurrence. Records without a
    /// question are kept as they are. Artifacts are deleted only after the
    /// output has been written; unreadable artifacts are left in place.
    pub async fn merge_all(&self, output: &Path) -> Result<MergeReport> {
        let artifacts = self.list_artifacts().await?;
        let existing: Vec<ConversationRecord> = read_json_file(output).await?.unwrap_or_default();
        let mut report = MergeReport {
            existing: existing.len(),
            ..MergeReport::default()
        };

        if artifacts.is_empty() {
            debug!(output = %output.display(), "No checkpoint artifacts to merge");
            report.total = existing.len();
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(existing.len());
        for record in existing {
            if remember(&mut seen, &record) {
                merged.push(record);
            } else {
                report.duplicates += 1;
            }
        }

        let mut consumed = Vec::new();
        for (key, path) in artifacts {
            let records: Vec<ConversationRecord> = match read_json_file(&path).await {
                Ok(Some(records)) => records,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                    continue;
                }
            };
            debug!(?key, records = records.len(), "Merging checkpoint");
            for record in records {
                if remember(&mut seen, &record) {
                    merged.push(record);
                    report.added += 1;
                } else {
                    report.duplicates += 1;
                }
            }
            consumed.push(path);
        }

        report.artifacts = consumed.len();
        report.total = merged.len();
        write_json_atomic(&merged, output).await?;

        for path in &consumed {
            if let Err(e) = fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete merged checkpoint");
            }
        }

        info!(
            output = %output.display(),
            artifacts = report.artifacts,
            added = report.added,
            duplicates = report.duplicates,
            total = report.total,
            "Checkpoints merged"
        );
        Ok(report)
    }
}

/// Insert the record's signature; false if it was already present.
fn remember(seen: &mut HashSet<String>, record: &ConversationRecord) -> bool {
    match record.user_question() {
        Some(question) => seen.insert(signature_of(question)),
        None => true,
    }
}
