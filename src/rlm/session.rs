//! Per-question state: the session itself plus the evidence, explored set,
//! candidates and audit records it owns.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::quality::QualityScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Exploration,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Exploration => "exploration",
        }
    }
}

/// One question-answering run.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub question: String,
    pub context: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub depth: u32,
    pub max_depth: u32,
    pub strategy: Strategy,
}

impl Session {
    pub fn new(question: &str, context: &str, strategy: Strategy, max_iterations: u32, depth: u32, max_depth: u32) -> Self {
        Self {
            id: session_id(question, Utc::now()),
            question: question.to_string(),
            context: context.to_string(),
            iteration: 0,
            max_iterations,
            depth,
            max_depth,
            strategy,
        }
    }

    /// Advance to the next iteration, or `None` once the budget is spent.
    pub fn next_iteration(&mut self) -> Option<u32> {
        if self.iteration >= self.max_iterations {
            return None;
        }
        self.iteration += 1;
        Some(self.iteration)
    }
}

/// `YYYYmmdd_HHMMSS_<8 hex>`; the digest keeps two sessions started in the
/// same second apart.
pub fn session_id(question: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S").to_string();
    let mut hasher = blake3::Hasher::new();
    hasher.update(question.as_bytes());
    hasher.update(&at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hasher.finalize().to_hex();
    format!("{stamp}_{}", &digest[..8])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingSource {
    /// A reader answer to a probe (direct strategy).
    Probe { probe: String },
    /// Printed output of one sandbox round (exploration strategy).
    Exploration { iteration: u32 },
    /// A proposed final answer the gate turned down.
    Rejection { iteration: u32 },
}

/// One accumulated piece of evidence. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub source: FindingSource,
    pub content: String,
}

impl Finding {
    /// How the finding reads inside prompts.
    pub fn render(&self) -> String {
        match &self.source {
            FindingSource::Probe { probe } => format!("Q: {probe}\nA: {}", self.content),
            FindingSource::Exploration { .. } | FindingSource::Rejection { .. } => self.content.clone(),
        }
    }
}

/// Segment indices visited so far. Grows only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExploredSet {
    indices: BTreeSet<usize>,
}

impl ExploredSet {
    /// Union in the indices the sandbox reported, dropping any outside
    /// `0..total`. Returns how many were new.
    pub fn merge(&mut self, reported: &[i64], total: usize) -> usize {
        let before = self.indices.len();
        for &idx in reported {
            if let Ok(i) = usize::try_from(idx) {
                if i < total {
                    self.indices.insert(i);
                }
            }
        }
        self.indices.len() - before
    }

    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn covers(&self, total: usize) -> bool {
        total > 0 && self.indices.len() >= total
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Intermediate,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAnswer {
    pub text: String,
    pub origin: CandidateOrigin,
    pub iteration: u32,
}

/// What an iteration sent out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Probe,
    FinalProposal,
    Code,
    ProposalFailed,
}

/// Append-only audit entry for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub kind: RecordKind,
    pub issued: String,
    pub response: Option<String>,
    pub candidate: Option<CandidateAnswer>,
    pub score: Option<QualityScore>,
    pub error: Option<String>,
}

impl IterationRecord {
    pub fn new(iteration: u32, kind: RecordKind, issued: impl Into<String>) -> Self {
        Self {
            iteration,
            kind,
            issued: issued.into(),
            response: None,
            candidate: None,
            score: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A proposed final answer passed the gate (or was taken unvetted).
    Accepted,
    /// An intermediate answer scored above the early-stop threshold.
    EarlyStop,
    /// Every segment was explored.
    AllSegmentsExplored,
    /// The iteration budget ran out.
    Exhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Accepted => "accepted",
            StopReason::EarlyStop => "early_stop",
            StopReason::AllSegmentsExplored => "all_segments_explored",
            StopReason::Exhausted => "exhausted",
        }
    }
}
