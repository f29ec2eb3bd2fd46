use anyhow::Result;
use clap::Args;
use tracing::info;

use super::SourceArgs;
use crate::config::RlmConfig;

/// Answer a question against a reference text
#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Also print the evidence gathered along the way
    #[arg(long)]
    pub evidence: bool,
}

pub async fn run(args: AskArgs, config: RlmConfig) -> Result<()> {
    let source = args.source.resolve()?;
    let context = source.load().await?;
    let engine = super::build_engine(config)?;

    info!(question = %args.question, source = %source.describe(), "Query started");
    let result = engine.answer(&args.question, &context).await?;

    println!("Q: {}\n", args.question);
    println!("A: {}\n", result.answer);
    println!(
        "Iterations: {} | Strategy: {} | Stop: {} | Score: {:.3}",
        result.iterations,
        result.strategy.as_str(),
        result.stop.as_str(),
        result.score.overall
    );
    if result.total_segments > 0 {
        println!(
            "Segments explored: {}/{}",
            result.explored, result.total_segments
        );
    }
    println!("Session: {}", result.session_id);

    if args.evidence && !result.evidence.is_empty() {
        println!("\nEvidence:");
        for (i, ev) in result.evidence.iter().enumerate() {
            println!("\n[{}]\n{}", i + 1, ev);
        }
    }

    Ok(())
}
