//! Scripted oracles for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{OracleError, OracleResult};
use super::oracle::{Axis, BossRequest, JudgingOracle, ProposalOracle, ReadingOracle, RequestKind, Rubric};

/// Judge backed by a closure over the rubric.
pub struct FnJudge<F>(pub F);

#[async_trait]
impl<F> JudgingOracle for FnJudge<F>
where
    F: Fn(&Rubric) -> OracleResult<String> + Send + Sync,
{
    async fn score_axis(&self, rubric: &Rubric) -> OracleResult<String> {
        (self.0)(rubric)
    }
}

/// Judge that gives the same per-axis scores to every answer.
pub fn fixed_scores(
    completeness: f64,
    accuracy: f64,
    confidence: f64,
    relevance: f64,
) -> FnJudge<impl Fn(&Rubric) -> OracleResult<String> + Send + Sync> {
    FnJudge(move |r: &Rubric| {
        let v = match r.axis {
            Axis::Completeness => completeness,
            Axis::Accuracy => accuracy,
            Axis::Confidence => confidence,
            Axis::Relevance => relevance,
        };
        Ok(v.to_string())
    })
}

/// Reader backed by a closure over (question, text).
pub struct FnReader<F>(pub F);

#[async_trait]
impl<F> ReadingOracle for FnReader<F>
where
    F: Fn(&str, &str) -> OracleResult<String> + Send + Sync,
{
    async fn ask(&self, question: &str, text: &str) -> OracleResult<String> {
        (self.0)(question, text)
    }
}

/// Boss that replays scripted replies per request kind. The last reply of a
/// script repeats once the earlier ones are used up.
#[derive(Default)]
pub struct ScriptedBoss {
    scripts: Mutex<HashMap<RequestKind, VecDeque<OracleResult<String>>>>,
    pub requests: Mutex<Vec<BossRequest>>,
}

impl ScriptedBoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, kind: RequestKind, replies: &[&str]) -> Self {
        self.script_results(kind, replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn script_results(self, kind: RequestKind, replies: Vec<OracleResult<String>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(kind, replies.into_iter().collect());
        self
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

#[async_trait]
impl ProposalOracle for ScriptedBoss {
    async fn propose(&self, request: &BossRequest) -> OracleResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&request.kind)
            .ok_or_else(|| OracleError::failed(format!("unscripted {:?}", request.kind)))?;
        match queue.len() {
            0 => Err(OracleError::failed("empty script")),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or(Err(OracleError::Empty)),
        }
    }
}
