use anyhow::Result;

use crate::config::RlmConfig;
use crate::llm::LlmClient;

fn render(config: &RlmConfig) -> String {
    format!(
        "RLM Configuration:\n  \
         max_iterations:         {}\n  \
         max_depth:              {}\n  \
         early_stop_threshold:   {}\n  \
         min_accuracy_threshold: {}\n  \
         split_threshold:        {} chars\n  \
         segment sizes:          target {} / max {} / min {}\n  \
         oracle_timeout:         {}s\n  \
         vet_exploration_final:  {}\n  \
         log_to_file:            {} ({})\n  \
         log_level:              {}",
        config.max_iterations,
        config.max_depth,
        config.early_stop_threshold,
        config.min_accuracy_threshold,
        config.split_threshold,
        config.segment_target_size,
        config.segment_max_size,
        config.segment_min_size,
        config.oracle_timeout_secs,
        config.vet_exploration_final,
        config.log_to_file,
        config.log_dir.display(),
        config.log_level,
    )
}

/// Print the effective configuration and the models each role talks to.
pub fn run(config: &RlmConfig) -> Result<()> {
    println!("{}", render(config));
    let llm = LlmClient::from_env()?;
    let (boss, reader, judge) = llm.models();
    println!("\nModels:\n  boss:   {boss}\n  reader: {reader}\n  judge:  {judge}");
    Ok(())
}
