//! `convoforge tools`: connect to the tool service and list its catalog.

use anyhow::Result;

use convoforge_config::ForgeConfig;
use convoforge_mcp::ToolClient;

use crate::terminal_output::{note_success, note_warn, render_table};
use crate::wiring;

const DESCRIPTION_WIDTH: usize = 60;

pub async fn run(config: &ForgeConfig) -> Result<()> {
    let client = ToolClient::new(wiring::session_settings(&config.mcp()))?;
    if !client.session().health_check().await {
        note_warn("No health endpoint answered; trying the session anyway");
    }

    let connected = client.connect().await;
    let tools = client.session().all_tools().await;
    client.disconnect().await;
    connected?;

    note_success(&format!("{} tools available", tools.len()));
    let rows: Vec<Vec<String>> = tools
        .iter()
        .map(|t| vec![t.name.clone(), clip(&t.description, DESCRIPTION_WIDTH)])
        .collect();
    print!("{}", render_table(&["Tool", "Description"], &rows));
    Ok(())
}

fn clip(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
