//! Capability seams for the three external models the engine talks to.
//!
//! The engine never sees a transport: it only holds `Arc<dyn ...>` handles to
//! these traits, so a real client and a scripted mock are interchangeable.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::{OracleError, OracleResult};

/// Reads a span of reference text and answers a focused question about it.
#[async_trait]
pub trait ReadingOracle: Send + Sync {
    async fn ask(&self, question: &str, text: &str) -> OracleResult<String>;
}

/// Scores one quality axis; the reply is expected to be a single number.
#[async_trait]
pub trait JudgingOracle: Send + Sync {
    async fn score_axis(&self, rubric: &Rubric) -> OracleResult<String>;
}

/// The boss role: proposes probes, exploration code and syntheses.
#[async_trait]
pub trait ProposalOracle: Send + Sync {
    async fn propose(&self, request: &BossRequest) -> OracleResult<String>;
}

/// The four axes the quality gate scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Completeness,
    Accuracy,
    Confidence,
    Relevance,
}

impl Axis {
    pub const ALL: [Axis; 4] = [
        Axis::Completeness,
        Axis::Accuracy,
        Axis::Confidence,
        Axis::Relevance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Completeness => "completeness",
            Axis::Accuracy => "accuracy",
            Axis::Confidence => "confidence",
            Axis::Relevance => "relevance",
        }
    }
}

/// A fully rendered judging request for one axis.
#[derive(Debug, Clone)]
pub struct Rubric {
    pub axis: Axis,
    pub system: String,
    pub prompt: String,
}

/// What a boss request is for. Adapters use it to pick sampling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Probe,
    ExplorationCode,
    IntermediateAnswer,
    SynthesizeFindings,
    FinalSynthesis,
}

impl RequestKind {
    pub fn temperature(&self) -> f32 {
        match self {
            RequestKind::Probe | RequestKind::ExplorationCode => 0.7,
            RequestKind::IntermediateAnswer | RequestKind::FinalSynthesis => 0.5,
            RequestKind::SynthesizeFindings => 0.3,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            RequestKind::Probe | RequestKind::IntermediateAnswer => 300,
            RequestKind::ExplorationCode => 600,
            RequestKind::SynthesizeFindings => 400,
            RequestKind::FinalSynthesis => 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BossRequest {
    pub kind: RequestKind,
    pub system: String,
    pub prompt: String,
}

/// Run an oracle future under a time budget; expiry is an oracle failure.
pub async fn within<T, F>(budget: Duration, fut: F) -> OracleResult<T>
where
    F: Future<Output = OracleResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(budget)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_passes_result_through() {
        let out = within(Duration::from_secs(1), async { Ok::<_, OracleError>(7) }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let out: OracleResult<()> = within(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(out, Err(OracleError::Timeout(Duration::from_millis(10))));
    }
}
