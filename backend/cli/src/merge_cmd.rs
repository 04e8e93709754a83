//! `convoforge merge`: fold leftover checkpoint artifacts into an output file.

use std::path::PathBuf;

use anyhow::Result;

use convoforge_config::ForgeConfig;

use crate::terminal_output::{note_info, note_success};
use crate::wiring;

pub async fn run(config: &ForgeConfig, output: Option<PathBuf>) -> Result<()> {
    let completion = config.completion();
    let output = output.unwrap_or_else(|| PathBuf::from(completion.output_file()));
    let checkpoints = wiring::checkpoint_manager(&completion);

    let pending = checkpoints.list_artifacts().await?;
    if pending.is_empty() {
        note_info(&format!(
            "No checkpoint artifacts in {}",
            checkpoints.dir().display()
        ));
        return Ok(());
    }

    let report = checkpoints.merge_all(&output).await?;
    note_success(&format!(
        "Merged {} artifacts into {}: {} added, {} duplicates dropped, {} total",
        report.artifacts,
        output.display(),
        report.added,
        report.duplicates,
        report.total
    ));
    Ok(())
}
