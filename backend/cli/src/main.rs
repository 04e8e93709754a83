mod complete_cmd;
mod merge_cmd;
mod stats_cmd;
mod terminal_output;
mod tools_cmd;
mod wiring;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use convoforge_config::{default_config_path, load_and_prepare};
use convoforge_logging::init_logger;

use complete_cmd::CompleteArgs;
use terminal_output::note_error;

#[derive(Parser)]
#[command(name = "convoforge")]
#[command(about = "ConvoForge: synthetic tool-calling conversations from a remote tool service")]
#[command(version)]
struct Cli {
    /// Config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete a question file with tool calls and answers
    Complete {
        /// Question file; defaults to completion.questionFile
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output file; defaults to completion.outputFile
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Skip this many leading items (resume point of an interrupted run)
        #[arg(long, default_value_t = 0)]
        start_index: usize,
    },
    /// Merge leftover checkpoint artifacts into the output file
    Merge {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show quota progress from the generation state file
    Stats,
    /// List the tools the service offers
    Tools,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "Command failed");
        note_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(default_config_path);
    let config = load_and_prepare(&path).await?;
    let logging = config.logging();
    init_logger(logging.dir(), logging.level());

    match cli.command {
        Commands::Complete {
            input,
            output,
            batch_size,
            start_index,
        } => {
            complete_cmd::run(
                &config,
                CompleteArgs {
                    input,
                    output,
                    batch_size,
                    start_index,
                },
            )
            .await
        }
        Commands::Merge { output } => merge_cmd::run(&config, output).await,
        Commands::Stats => stats_cmd::run(&config),
        Commands::Tools => tools_cmd::run(&config).await,
    }
}
