use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::RlmConfig;

/// Run a JSON question set and compare answers with expectations
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Question set file
    pub questions: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    pub context: String,
    pub expected_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

/// Either `{"test_sets": [...]}` or a bare list of sets.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    Wrapped { test_sets: Vec<TestSet> },
    Bare(Vec<TestSet>),
}

pub fn parse_sets(raw: &str) -> Result<Vec<TestSet>> {
    let file: QuestionFile = serde_json::from_str(raw).context("Invalid question set JSON")?;
    Ok(match file {
        QuestionFile::Wrapped { test_sets } => test_sets,
        QuestionFile::Bare(sets) => sets,
    })
}

fn exact_match(answer: &str, expected: Option<&str>) -> bool {
    expected.is_some_and(|e| e.trim() == answer.trim())
}

pub async fn run(args: BatchArgs, config: RlmConfig) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.questions)
        .await
        .with_context(|| format!("Failed to read {}", args.questions.display()))?;
    let sets = parse_sets(&raw)?;
    let engine = super::build_engine(config)?;

    let mut total = 0usize;
    let mut matched = 0usize;
    for set in &sets {
        println!("=== {} ===", set.name);
        if !set.description.is_empty() {
            println!("{}\n", set.description);
        }

        for q in &set.questions {
            total += 1;
            info!(id = %q.id, context_len = q.context.len(), "Running question");
            println!("[{}] {}", q.id, q.question);

            let answer = match engine.answer(&q.question, &q.context).await {
                Ok(resp) => {
                    println!(
                        "  iterations: {} | strategy: {} | stop: {} | score: {:.3}",
                        resp.iterations,
                        resp.strategy.as_str(),
                        resp.stop.as_str(),
                        resp.score.overall
                    );
                    resp.answer
                }
                Err(e) => {
                    warn!(id = %q.id, error = %e, "Question failed");
                    println!("  error: {e}\n");
                    continue;
                }
            };

            println!("  expected: {}", q.expected_answer.as_deref().unwrap_or("N/A"));
            println!("  answer:   {}", answer);
            if exact_match(&answer, q.expected_answer.as_deref()) {
                matched += 1;
                println!("  EXACT MATCH\n");
            } else {
                println!("  different (check manually)\n");
            }
        }
    }

    println!("{matched}/{total} exact matches");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_and_bare() {
        let wrapped = r#"{"test_sets":[{"name":"Easy","description":"d","questions":[
            {"id":"q1","question":"Who?","context":"Jane.","expected_answer":"Jane"}]}]}"#;
        let sets = parse_sets(wrapped).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].questions[0].expected_answer.as_deref(), Some("Jane"));

        let bare = r#"[{"name":"Hard","questions":[{"id":"q2","question":"What?","context":"x"}]}]"#;
        let sets = parse_sets(bare).unwrap();
        assert_eq!(sets[0].name, "Hard");
        assert!(sets[0].questions[0].expected_answer.is_none());

        assert!(parse_sets(r#"{"sets":[]}"#).is_err());
    }

    #[test]
    fn test_exact_match_trims() {
        assert!(exact_match(" Jane \n", Some("Jane")));
        assert!(!exact_match("Jane", Some("Bob")));
        assert!(!exact_match("Jane", None));
    }
}
