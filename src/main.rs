mod audit;
mod commands;
mod config;
mod llm;
mod rlm;
mod source;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::{ask::AskArgs, batch::BatchArgs, segment::SegmentArgs};
use config::RlmConfig;

/// Recursive language model question answering over long reference texts.
#[derive(Parser)]
#[command(name = "rlm", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Ask(AskArgs),
    Segment(SegmentArgs),
    Batch(BatchArgs),
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let config = RlmConfig::from_env()?;

    // RUST_LOG wins over LOG_LEVEL; logs go to stderr so answers stay pipeable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(
        max_iterations = config.max_iterations,
        max_depth = config.max_depth,
        split_threshold = config.split_threshold,
        "Configuration loaded"
    );

    match cli.command {
        Command::Ask(args) => commands::ask::run(args, config).await,
        Command::Segment(args) => commands::segment::run(args, config).await,
        Command::Batch(args) => commands::batch::run(args, config).await,
        Command::Config => commands::config::run(&config),
    }
}
