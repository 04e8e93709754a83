//! `convoforge complete`: fill in answers for a question file.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use convoforge_config::{read_json_file, validate, ForgeConfig};
use convoforge_core::ConversationRecord;
use convoforge_mcp::ToolClient;
use convoforge_pipeline::{
    BatchOrchestrator, BatchRunner, ConversationCompleter, RunContext, ShutdownReason,
};

use crate::terminal_output::{note_error, note_info, note_success, note_warn, percent, render_table};
use crate::wiring;

pub struct CompleteArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub start_index: usize,
}

pub async fn run(config: &ForgeConfig, args: CompleteArgs) -> Result<()> {
    let report = validate(config);
    if !report.is_valid() {
        for error in &report.errors {
            note_error(&error.to_string());
        }
        bail!("Configuration is not valid for a completion run");
    }

    let completion = config.completion();
    let input = args
        .input
        .unwrap_or_else(|| PathBuf::from(completion.question_file()));
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(completion.output_file()));

    let items: Vec<ConversationRecord> = read_json_file(&input)
        .await?
        .with_context(|| format!("Question file {} not found", input.display()))?;
    note_info(&format!(
        "Loaded {} items from {}",
        items.len(),
        input.display()
    ));

    let client = Arc::new(ToolClient::new(wiring::session_settings(&config.mcp()))?);
    match client.connect().await {
        Ok(()) => note_success(&format!(
            "Tool service connected ({} tools)",
            client.available_tools().await.len()
        )),
        // Calls connect lazily; a run without tools still produces plain replies.
        Err(e) => note_warn(&format!("Tool service unavailable, continuing: {e}")),
    }

    let llm = Arc::new(wiring::llm_provider(&config.api())?);
    let tracker = Arc::new(Mutex::new(wiring::open_tracker(&config.generation())?));

    let ctx = RunContext::new(
        args.start_index,
        &output,
        wiring::checkpoint_manager(&completion),
        client.clone(),
    )
    .with_signal_handlers();
    info!(run_id = %ctx.run_id(), start = args.start_index, "Completion run starting");

    let completer = ConversationCompleter::new(llm, client.clone(), wiring::completion_settings(config))
        .with_run_id(ctx.run_id());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(completer),
        tracker,
        wiring::orchestrator_settings(config),
    )
    .with_run_id(ctx.run_id());
    let runner = BatchRunner::new(
        orchestrator,
        wiring::runner_settings(&completion, args.batch_size),
    );

    let result = runner.run(&items, &ctx).await;
    let reason = match &result {
        Ok(summary) if summary.interrupted => ShutdownReason::Interrupted("signal".into()),
        Ok(_) => ShutdownReason::Completed,
        Err(e) => ShutdownReason::Failed(format!("{e:#}")),
    };
    let shutdown = ctx.shutdown(reason).await?;
    let summary = result?;

    println!();
    let rows = vec![
        vec!["items".to_string(), summary.total_items.to_string()],
        vec!["start offset".to_string(), summary.start_offset.to_string()],
        vec!["batches".to_string(), summary.batches_run.to_string()],
        vec!["processed".to_string(), summary.processed.to_string()],
        vec!["recorded".to_string(), summary.recorded.to_string()],
        vec!["passed through".to_string(), summary.passed_through.to_string()],
        vec!["discarded".to_string(), summary.discarded.to_string()],
        vec!["skipped".to_string(), summary.skipped.to_string()],
        vec!["failed".to_string(), summary.failed.to_string()],
        vec![
            "success rate".to_string(),
            percent(summary.success_rate() / 100.0),
        ],
    ];
    print!("{}", render_table(&["Run", ""], &rows));

    let stats = client.telemetry().stats().await;
    if !stats.is_empty() {
        let mut names: Vec<_> = stats.keys().cloned().collect();
        names.sort();
        let rows: Vec<Vec<String>> = names
            .iter()
            .map(|name| {
                let s = &stats[name];
                vec![
                    name.clone(),
                    s.total_calls.to_string(),
                    percent(s.success_rate()),
                    s.total_retries.to_string(),
                    format!("{:.0}", s.avg_duration_ms()),
                ]
            })
            .collect();
        println!();
        print!(
            "{}",
            render_table(&["Tool", "Calls", "Success", "Retries", "Avg ms"], &rows)
        );
    }

    if let Some(shutdown) = shutdown {
        println!();
        note_success(&format!(
            "{} records in {}",
            shutdown.merge.total,
            output.display()
        ));
        if summary.interrupted {
            warn!(resume_offset = shutdown.resume_offset, "Run interrupted");
            note_warn(&format!(
                "Interrupted. Resume with --start-index {}",
                shutdown.resume_offset
            ));
        }
    }
    Ok(())
}
