use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::oracle::{within, Axis, JudgingOracle, Rubric};
use super::prompts;

/// Axis score used when the judge fails or replies with something unusable.
pub const NEUTRAL: f64 = 0.5;
/// An accuracy below this on a non-trivial answer triggers a second opinion.
const SECOND_OPINION_BELOW: f64 = 0.3;
/// Answers this short (in chars) never get a second opinion.
const TRIVIAL_ANSWER_LEN: usize = 10;
/// The second opinion replaces the first only when they differ by more than this.
const SECOND_OPINION_MARGIN: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityScore {
    pub completeness: f64,
    pub accuracy: f64,
    pub confidence: f64,
    pub relevance: f64,
    pub overall: f64,
}

impl QualityScore {
    pub fn from_axes(completeness: f64, accuracy: f64, confidence: f64, relevance: f64, weights: Weights) -> Self {
        let mut score = Self {
            completeness,
            accuracy,
            confidence,
            relevance,
            overall: 0.0,
        };
        score.overall = weights.overall(&score);
        score
    }
}

/// Axis weights in hundredths, so each set sums to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    pub completeness: u32,
    pub accuracy: u32,
    pub confidence: u32,
    pub relevance: u32,
}

impl Weights {
    pub const fn final_answer() -> Self {
        Self {
            completeness: 35,
            accuracy: 35,
            confidence: 15,
            relevance: 15,
        }
    }

    /// Confidence counts for little before all evidence is in.
    pub const fn intermediate() -> Self {
        Self {
            completeness: 25,
            accuracy: 45,
            confidence: 5,
            relevance: 25,
        }
    }

    pub fn for_candidate(is_final: bool) -> Self {
        if is_final {
            Self::final_answer()
        } else {
            Self::intermediate()
        }
    }

    pub fn sum(&self) -> u32 {
        self.completeness + self.accuracy + self.confidence + self.relevance
    }

    /// Weighted sum of the axes, rounded to three decimals.
    pub fn overall(&self, s: &QualityScore) -> f64 {
        let raw = (s.completeness * f64::from(self.completeness)
            + s.accuracy * f64::from(self.accuracy)
            + s.confidence * f64::from(self.confidence)
            + s.relevance * f64::from(self.relevance))
            / f64::from(self.sum());
        (raw * 1000.0).round() / 1000.0
    }
}

/// Parse a judge reply: the first token, trailing punctuation dropped, must
/// be a number in [0, 1].
pub fn parse_score(reply: &str) -> Option<f64> {
    let token = reply.split_whitespace().next()?;
    let token = token.trim_end_matches(|c: char| !c.is_ascii_digit());
    let value: f64 = token.parse().ok()?;
    (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Continue,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_accuracy: f64,
    pub early_stop: f64,
}

impl Thresholds {
    /// The accuracy floor comes first; then the overall score must reach
    /// the early-stop threshold.
    pub fn decide(&self, score: &QualityScore) -> GateDecision {
        if score.accuracy < self.min_accuracy {
            GateDecision::Reject
        } else if score.overall >= self.early_stop {
            GateDecision::Accept
        } else {
            GateDecision::Continue
        }
    }

    /// Whether intermediate answers may end a direct session early. A zero
    /// threshold turns that off; final proposals are still gated.
    pub fn early_stop_enabled(&self) -> bool {
        self.early_stop > 0.0
    }
}

/// Scores candidate answers with the judging oracle, one axis at a time.
pub struct QualityGate {
    judge: Arc<dyn JudgingOracle>,
    timeout: Duration,
}

impl QualityGate {
    pub fn new(judge: Arc<dyn JudgingOracle>, timeout: Duration) -> Self {
        Self { judge, timeout }
    }

    pub async fn score(&self, question: &str, answer: &str, context: &str, is_final: bool) -> QualityScore {
        let mut axes = [NEUTRAL; 4];
        for (slot, axis) in axes.iter_mut().zip(Axis::ALL) {
            let rubric = Rubric {
                axis,
                system: prompts::judge_system(axis).to_string(),
                prompt: prompts::judge_prompt(axis, question, answer, context),
            };
            *slot = self.ask(&rubric).await.unwrap_or(NEUTRAL);
        }

        let first = axes[1];
        if first < SECOND_OPINION_BELOW && answer.chars().count() > TRIVIAL_ANSWER_LEN {
            axes[1] = self.second_opinion(answer, context, first).await;
        }

        let score = QualityScore::from_axes(axes[0], axes[1], axes[2], axes[3], Weights::for_candidate(is_final));
        debug!(
            completeness = score.completeness,
            accuracy = score.accuracy,
            confidence = score.confidence,
            relevance = score.relevance,
            overall = score.overall,
            is_final,
            "Scored candidate"
        );
        score
    }

    async fn second_opinion(&self, answer: &str, context: &str, first: f64) -> f64 {
        let rubric = Rubric {
            axis: Axis::Accuracy,
            system: prompts::SECOND_OPINION_SYSTEM.to_string(),
            prompt: prompts::second_opinion_prompt(answer, context, first),
        };
        match self.ask(&rubric).await {
            Some(second) if (second - first).abs() > SECOND_OPINION_MARGIN => {
                debug!(first, second, "Accuracy second opinion overrides first score");
                first.max(second)
            }
            _ => first,
        }
    }

    /// One judge call; `None` when the call fails or the reply is unusable.
    async fn ask(&self, rubric: &Rubric) -> Option<f64> {
        match within(self.timeout, self.judge.score_axis(rubric)).await {
            Ok(reply) => {
                let parsed = parse_score(&reply);
                if parsed.is_none() {
                    warn!(axis = rubric.axis.as_str(), reply = %reply.trim(), "Unparseable judge score, using neutral");
                }
                parsed
            }
            Err(e) => {
                warn!(axis = rubric.axis.as_str(), error = %e, "Judge call failed, using neutral");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlm::error::OracleError;
    use crate::rlm::testing::{fixed_scores, FnJudge};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate(judge: impl JudgingOracle + 'static) -> QualityGate {
        QualityGate::new(Arc::new(judge), Duration::from_secs(5))
    }

    #[test]
    fn test_weight_sums() {
        assert_eq!(Weights::final_answer().sum(), 100);
        assert_eq!(Weights::intermediate().sum(), 100);
        for w in [Weights::final_answer(), Weights::intermediate()] {
            assert_eq!(QualityScore::from_axes(1.0, 1.0, 1.0, 1.0, w).overall, 1.0);
            assert_eq!(QualityScore::from_axes(0.0, 0.0, 0.0, 0.0, w).overall, 0.0);
        }
    }

    #[test]
    fn test_overall_rounded_to_three_places() {
        let s = QualityScore::from_axes(0.333, 0.777, 0.111, 0.999, Weights::intermediate());
        // 0.08325 + 0.34965 + 0.00555 + 0.24975 = 0.6882
        assert_eq!(s.overall, 0.688);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.8"), Some(0.8));
        assert_eq!(parse_score(" 1.0.\n"), Some(1.0));
        assert_eq!(parse_score("0.65, mostly right"), Some(0.65));
        assert_eq!(parse_score("0"), Some(0.0));
        assert_eq!(parse_score("1.5"), None);
        assert_eq!(parse_score("-0.2"), None);
        assert_eq!(parse_score("high"), None);
        assert_eq!(parse_score("NaN"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn test_acceptance_gating() {
        let t = Thresholds {
            min_accuracy: 0.7,
            early_stop: 0.8,
        };
        let with = |accuracy, overall| QualityScore {
            completeness: 0.0,
            accuracy,
            confidence: 0.0,
            relevance: 0.0,
            overall,
        };
        assert_eq!(t.decide(&with(0.6, 0.9)), GateDecision::Reject);
        assert_eq!(t.decide(&with(0.75, 0.79)), GateDecision::Continue);
        assert_eq!(t.decide(&with(0.8, 0.85)), GateDecision::Accept);

        let zero = Thresholds {
            min_accuracy: 0.7,
            early_stop: 0.0,
        };
        assert!(!zero.early_stop_enabled());
        assert!(t.early_stop_enabled());
        assert_eq!(zero.decide(&with(1.0, 1.0)), GateDecision::Accept);
        assert_eq!(zero.decide(&with(0.7, 0.0)), GateDecision::Accept);
        assert_eq!(zero.decide(&with(0.5, 1.0)), GateDecision::Reject);
    }

    #[tokio::test]
    async fn test_malformed_axis_defaults_to_neutral() {
        let judge = FnJudge(|r: &Rubric| match r.axis {
            Axis::Completeness => Ok("excellent".to_string()),
            Axis::Accuracy => Ok("0.9".to_string()),
            Axis::Confidence => Ok("7".to_string()),
            Axis::Relevance => Err(OracleError::failed("boom")),
        });
        let s = gate(judge).score("q", "an answer", "ctx", true).await;
        assert_eq!(s.completeness, NEUTRAL);
        assert_eq!(s.accuracy, 0.9);
        assert_eq!(s.confidence, NEUTRAL);
        assert_eq!(s.relevance, NEUTRAL);
    }

    #[tokio::test]
    async fn test_second_opinion_keeps_higher_score() {
        let judge = FnJudge(|r: &Rubric| match (r.axis, r.system == prompts::SECOND_OPINION_SYSTEM) {
            (Axis::Accuracy, false) => Ok("0.1".to_string()),
            (Axis::Accuracy, true) => Ok("0.8".to_string()),
            _ => Ok("1.0".to_string()),
        });
        let s = gate(judge).score("q", "Revenue was $3.5M", "ctx", true).await;
        assert_eq!(s.accuracy, 0.8);
    }

    #[tokio::test]
    async fn test_second_opinion_within_margin_keeps_first() {
        let judge = FnJudge(|r: &Rubric| match (r.axis, r.system == prompts::SECOND_OPINION_SYSTEM) {
            (Axis::Accuracy, false) => Ok("0.2".to_string()),
            (Axis::Accuracy, true) => Ok("0.4".to_string()),
            _ => Ok("1.0".to_string()),
        });
        let s = gate(judge).score("q", "Revenue was $3.5M", "ctx", false).await;
        assert_eq!(s.accuracy, 0.2);
    }

    #[tokio::test]
    async fn test_trivial_answer_skips_second_opinion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let judge = FnJudge(move |r: &Rubric| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(if r.axis == Axis::Accuracy { "0.0" } else { "1.0" }.to_string())
        });
        let s = gate(judge).score("q", "no", "ctx", false).await;
        assert_eq!(s.accuracy, 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fixed_scores_weighted() {
        let s = gate(fixed_scores(1.0, 0.5, 0.0, 1.0)).score("q", "answer text", "ctx", true).await;
        // 0.35 + 0.175 + 0 + 0.15
        assert_eq!(s.overall, 0.675);
    }
}
