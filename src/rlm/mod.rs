pub mod error;
pub mod exec;
pub mod keywords;
pub mod oracle;
pub mod prompts;
pub mod quality;
pub mod repl;
pub mod segment;
pub mod session;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::config::RlmConfig;

use error::{OracleResult, RlmError};
use exec::{Sandbox, SandboxSeed};
use oracle::{within, BossRequest, JudgingOracle, ProposalOracle, ReadingOracle, RequestKind};
use prompts::ExplorationView;
use quality::{GateDecision, QualityGate, QualityScore};
use repl::{CodeDirective, ProbeDirective};
use session::{
    CandidateAnswer, CandidateOrigin, ExploredSet, Finding, FindingSource, IterationRecord, RecordKind,
    Session, StopReason, Strategy,
};

/// Lines of a multi-line payload dumped at debug level.
const LOG_LINES: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct RlmResponse {
    pub session_id: String,
    pub answer: String,
    pub iterations: u32,
    pub strategy: Strategy,
    pub stop: StopReason,
    /// Final-weighted score of the returned answer.
    pub score: QualityScore,
    /// Rendered findings, in the order they were gathered.
    pub evidence: Vec<String>,
    pub records: Vec<IterationRecord>,
    pub explored: usize,
    pub total_segments: usize,
}

fn log_block(label: &str, text: &str) {
    debug!(len = text.len(), "─── {} ───", label);
    for line in text.lines().take(LOG_LINES) {
        debug!("  │ {}", line);
    }
    let total = text.lines().count();
    if total > LOG_LINES {
        debug!("  │ ... ({} lines total)", total);
    }
}

fn render(findings: &[Finding]) -> Vec<String> {
    findings.iter().map(Finding::render).collect()
}

/// Audit trail for one session: every record is kept for the response and
/// handed to the sink as it is appended.
struct Trail<'a> {
    session_id: &'a str,
    sink: &'a dyn AuditSink,
    records: Vec<IterationRecord>,
}

impl<'a> Trail<'a> {
    fn new(session_id: &'a str, sink: &'a dyn AuditSink) -> Self {
        Self {
            session_id,
            sink,
            records: Vec::new(),
        }
    }

    fn emit(&self, event: &AuditEvent) {
        if let Err(e) = self.sink.append(self.session_id, event) {
            warn!(session = %self.session_id, error = %e, "Failed to write audit event");
        }
    }

    fn push(&mut self, record: IterationRecord) {
        self.emit(&AuditEvent::Iteration(record.clone()));
        self.records.push(record);
    }
}

/// How a session ended, before it is turned into a response.
struct Outcome {
    answer: String,
    stop: StopReason,
    score: QualityScore,
    evidence: Vec<String>,
    explored: usize,
    total_segments: usize,
}

pub struct RlmEngine {
    boss: Arc<dyn ProposalOracle>,
    reader: Arc<dyn ReadingOracle>,
    gate: QualityGate,
    audit: Arc<dyn AuditSink>,
    config: RlmConfig,
}

impl RlmEngine {
    pub fn new(
        boss: Arc<dyn ProposalOracle>,
        reader: Arc<dyn ReadingOracle>,
        judge: Arc<dyn JudgingOracle>,
        audit: Arc<dyn AuditSink>,
        config: RlmConfig,
    ) -> Self {
        let gate = QualityGate::new(judge, config.oracle_timeout());
        Self {
            boss,
            reader,
            gate,
            audit,
            config,
        }
    }

    /// Answer a top-level question.
    pub async fn answer(&self, question: &str, context: &str) -> Result<RlmResponse, RlmError> {
        self.answer_at_depth(question, context, 0).await
    }

    /// Answer at a given recursion depth. Fails before any oracle call when
    /// `depth` exceeds the configured maximum.
    pub async fn answer_at_depth(&self, question: &str, context: &str, depth: u32) -> Result<RlmResponse, RlmError> {
        if depth > self.config.max_depth {
            return Err(RlmError::DepthExceeded {
                depth,
                max_depth: self.config.max_depth,
            });
        }

        let context_len = context.chars().count();
        let strategy = if context_len > self.config.split_threshold {
            Strategy::Exploration
        } else {
            Strategy::Direct
        };
        let mut session = Session::new(
            question,
            context,
            strategy,
            self.config.max_iterations,
            depth,
            self.config.max_depth,
        );

        info!(
            session = %session.id,
            strategy = session.strategy.as_str(),
            context_len,
            depth = session.depth,
            max_depth = session.max_depth,
            max_iterations = session.max_iterations,
            "Starting RLM session"
        );

        let session_id = session.id.clone();
        let mut trail = Trail::new(&session_id, self.audit.as_ref());
        trail.emit(&AuditEvent::Start {
            question: question.to_string(),
            context_len,
            strategy: session.strategy,
            depth: session.depth,
        });

        let outcome = match session.strategy {
            Strategy::Direct => self.run_direct(&mut session, &mut trail).await,
            Strategy::Exploration => self.run_exploration(&mut session, &mut trail).await,
        };

        info!(
            session = %session.id,
            iterations = session.iteration,
            stop = outcome.stop.as_str(),
            overall = outcome.score.overall,
            "RLM complete"
        );
        log_block("Final Answer", &outcome.answer);

        trail.emit(&AuditEvent::Final {
            answer: outcome.answer.clone(),
            iterations: session.iteration,
            stop: outcome.stop,
            score: outcome.score,
            explored: outcome.explored,
            total_segments: outcome.total_segments,
        });

        Ok(RlmResponse {
            session_id: session.id,
            answer: outcome.answer,
            iterations: session.iteration,
            strategy,
            stop: outcome.stop,
            score: outcome.score,
            evidence: outcome.evidence,
            records: trail.records,
            explored: outcome.explored,
            total_segments: outcome.total_segments,
        })
    }

    async fn propose(&self, kind: RequestKind, system: &str, prompt: String) -> OracleResult<String> {
        let request = BossRequest {
            kind,
            system: system.to_string(),
            prompt,
        };
        let reply = within(self.config.oracle_timeout(), self.boss.propose(&request)).await?;
        log_block("Boss Response", &reply);
        Ok(reply)
    }

    /// Shared propose-and-gate step for final-answer proposals from either
    /// strategy. Returns the final-weighted score and whether it passed.
    async fn vet_final(&self, session: &Session, answer: &str) -> (QualityScore, bool) {
        let score = self
            .gate
            .score(&session.question, answer, &session.context, true)
            .await;
        let accepted = self.config.thresholds().decide(&score) == GateDecision::Accept;
        info!(
            iteration = session.iteration,
            accuracy = score.accuracy,
            overall = score.overall,
            accepted,
            "Final answer proposal vetted"
        );
        (score, accepted)
    }

    async fn run_direct(&self, session: &mut Session, trail: &mut Trail<'_>) -> Outcome {
        let ranking = keywords::is_ranking_question(&session.question);
        let thresholds = self.config.thresholds();
        let mut evidence: Vec<Finding> = Vec::new();

        while let Some(iteration) = session.next_iteration() {
            let prompt = prompts::probe_prompt(&session.question, &render(&evidence), iteration, session.max_iterations);
            let reply = match self.propose(RequestKind::Probe, prompts::BOSS_SYSTEM, prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(iteration, error = %e, "Probe generation failed");
                    let mut record = IterationRecord::new(iteration, RecordKind::ProposalFailed, "");
                    record.error = Some(e.to_string());
                    trail.push(record);
                    continue;
                }
            };

            match ProbeDirective::parse(&reply) {
                ProbeDirective::Final(answer) => {
                    let mut record = IterationRecord::new(iteration, RecordKind::FinalProposal, reply.trim());
                    let (score, accepted) = self.vet_final(session, &answer).await;
                    record.candidate = Some(CandidateAnswer {
                        text: answer.clone(),
                        origin: CandidateOrigin::Final,
                        iteration,
                    });
                    record.score = Some(score);
                    trail.push(record);

                    if accepted {
                        return Outcome {
                            answer,
                            stop: StopReason::Accepted,
                            score,
                            evidence: render(&evidence),
                            explored: 0,
                            total_segments: 0,
                        };
                    }
                    evidence.push(Finding {
                        source: FindingSource::Rejection { iteration },
                        content: prompts::rejection_notice(&answer, &score, &self.config.thresholds()),
                    });
                }
                ProbeDirective::Probe(probe) => {
                    let probe = if ranking {
                        format!("{probe}{}", prompts::QUALIFIER_SUFFIX)
                    } else {
                        probe
                    };
                    debug!(iteration, probe = %probe, "Issuing probe");
                    let mut record = IterationRecord::new(iteration, RecordKind::Probe, probe.clone());

                    let timeout = self.config.oracle_timeout();
                    match within(timeout, self.reader.ask(&probe, &session.context)).await {
                        Ok(answer) => {
                            log_block("Reader Response", &answer);
                            record.response = Some(answer.clone());
                            evidence.push(Finding {
                                source: FindingSource::Probe { probe },
                                content: answer,
                            });
                        }
                        Err(e) => {
                            warn!(iteration, error = %e, "Reader call failed");
                            record.error = Some(e.to_string());
                            trail.push(record);
                            continue;
                        }
                    }

                    let prompt = prompts::intermediate_prompt(&session.question, &render(&evidence));
                    let candidate = match self
                        .propose(RequestKind::IntermediateAnswer, prompts::INTERMEDIATE_SYSTEM, prompt)
                        .await
                    {
                        Ok(c) => c.trim().to_string(),
                        Err(e) => {
                            warn!(iteration, error = %e, "Intermediate synthesis failed");
                            record.error = Some(format!("intermediate synthesis failed: {e}"));
                            trail.push(record);
                            continue;
                        }
                    };

                    let score = self
                        .gate
                        .score(&session.question, &candidate, &session.context, false)
                        .await;
                    record.candidate = Some(CandidateAnswer {
                        text: candidate.clone(),
                        origin: CandidateOrigin::Intermediate,
                        iteration,
                    });
                    record.score = Some(score);
                    trail.push(record);

                    match thresholds.decide(&score) {
                        GateDecision::Accept if thresholds.early_stop_enabled() => {
                            let score = self
                                .gate
                                .score(&session.question, &candidate, &session.context, true)
                                .await;
                            info!(iteration, overall = score.overall, "Early stop on intermediate answer");
                            return Outcome {
                                answer: candidate,
                                stop: StopReason::EarlyStop,
                                score,
                                evidence: render(&evidence),
                                explored: 0,
                                total_segments: 0,
                            };
                        }
                        GateDecision::Reject => {
                            debug!(iteration, accuracy = score.accuracy, "Accuracy below floor, continuing");
                        }
                        GateDecision::Accept | GateDecision::Continue => {
                            debug!(iteration, overall = score.overall, "No early stop, continuing");
                        }
                    }
                }
            }
        }

        warn!(evidence_count = evidence.len(), "RLM hit max iterations");
        let rendered = render(&evidence);
        let answer = self.synthesize_final(&session.question, &rendered).await;
        let score = self
            .gate
            .score(&session.question, &answer, &session.context, true)
            .await;
        Outcome {
            answer,
            stop: StopReason::Exhausted,
            score,
            evidence: rendered,
            explored: 0,
            total_segments: 0,
        }
    }

    async fn run_exploration(&self, session: &mut Session, trail: &mut Trail<'_>) -> Outcome {
        let segments = segment::segment(&session.context, &self.config.segment_bounds());
        let total = segments.len();
        let keywords = keywords::extract_keywords(&session.question);
        info!(segments = total, keywords = ?keywords, "Context segmented for exploration");

        let sandbox = Sandbox::spawn(
            SandboxSeed {
                question: session.question.clone(),
                segments: segments.into_iter().map(|s| s.text).collect(),
                keywords: keywords.clone(),
            },
            self.reader.clone(),
            self.config.oracle_timeout(),
        );

        let system = format!("{}{}", prompts::BOSS_SYSTEM, prompts::EXPLORER_SYSTEM);
        let mut findings: Vec<Finding> = Vec::new();
        let mut explored = ExploredSet::default();
        let mut best: Option<(CandidateAnswer, QualityScore)> = None;

        let finish = |answer: String, stop, score, findings: &[Finding], explored: &ExploredSet| Outcome {
            answer,
            stop,
            score,
            evidence: render(findings),
            explored: explored.count(),
            total_segments: total,
        };

        while let Some(iteration) = session.next_iteration() {
            let rendered = render(&findings);
            let visited = explored.to_vec();
            let prompt = prompts::exploration_prompt(&ExplorationView {
                question: &session.question,
                total_segments: total,
                explored: &visited,
                findings: &rendered,
                keywords: &keywords,
                iteration,
                max_iterations: session.max_iterations,
            });
            let reply = match self.propose(RequestKind::ExplorationCode, &system, prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(iteration, error = %e, "Code generation failed");
                    let mut record = IterationRecord::new(iteration, RecordKind::ProposalFailed, "");
                    record.error = Some(e.to_string());
                    trail.push(record);
                    continue;
                }
            };

            match CodeDirective::parse(&reply) {
                CodeDirective::Final(answer) => {
                    let mut record = IterationRecord::new(iteration, RecordKind::FinalProposal, reply.trim());
                    record.candidate = Some(CandidateAnswer {
                        text: answer.clone(),
                        origin: CandidateOrigin::Final,
                        iteration,
                    });

                    let (score, accepted) = if self.config.vet_exploration_final {
                        self.vet_final(session, &answer).await
                    } else {
                        let score = self
                            .gate
                            .score(&session.question, &answer, &session.context, true)
                            .await;
                        (score, true)
                    };
                    record.score = Some(score);
                    trail.push(record);

                    if accepted {
                        return finish(answer, StopReason::Accepted, score, &findings, &explored);
                    }
                    findings.push(Finding {
                        source: FindingSource::Rejection { iteration },
                        content: prompts::rejection_notice(&answer, &score, &self.config.thresholds()),
                    });
                    self.resync(&sandbox, &findings, &explored).await;
                }
                CodeDirective::Code(code) => {
                    log_block("Executing Code", &code);
                    let mut record = IterationRecord::new(iteration, RecordKind::Code, code.clone());
                    let result = sandbox.execute(&code).await;
                    log_block("Code Output", &result.output);
                    if !result.output.is_empty() {
                        record.response = Some(result.output.clone());
                    }

                    if let Some(e) = result.error.as_ref().filter(|_| !result.success) {
                        warn!(iteration, error = %e, "Sandbox execution failed");
                        record.error = Some(e.to_string());
                        trail.push(record);
                        self.resync(&sandbox, &findings, &explored).await;
                        continue;
                    }

                    let newly = explored.merge(&result.explored, total);
                    debug!(
                        iteration,
                        newly_explored = newly,
                        explored = explored.count(),
                        total,
                        names = ?result.names_introduced,
                        "Sandbox round complete"
                    );

                    if result.output.trim().is_empty() {
                        trail.push(record);
                        self.resync(&sandbox, &findings, &explored).await;
                        continue;
                    }

                    findings.push(Finding {
                        source: FindingSource::Exploration { iteration },
                        content: result.output.trim().to_string(),
                    });
                    self.resync(&sandbox, &findings, &explored).await;

                    let candidate = self.synthesize_findings(&session.question, &findings).await;
                    let score = self
                        .gate
                        .score(&session.question, &candidate, &session.context, false)
                        .await;
                    let candidate = CandidateAnswer {
                        text: candidate,
                        origin: CandidateOrigin::Intermediate,
                        iteration,
                    };
                    record.candidate = Some(candidate.clone());
                    record.score = Some(score);
                    trail.push(record);

                    if best.as_ref().map_or(true, |(_, s)| score.overall >= s.overall) {
                        best = Some((candidate.clone(), score));
                    }

                    if explored.covers(total) {
                        info!(iteration, total, "All segments explored");
                        let score = self
                            .gate
                            .score(&session.question, &candidate.text, &session.context, true)
                            .await;
                        return finish(candidate.text, StopReason::AllSegmentsExplored, score, &findings, &explored);
                    }
                }
            }
        }

        warn!(
            explored = explored.count(),
            total,
            findings = findings.len(),
            "RLM hit max iterations"
        );
        let answer = match best {
            Some((candidate, _)) => candidate.text,
            None => self.synthesize_final(&session.question, &render(&findings)).await,
        };
        let score = self
            .gate
            .score(&session.question, &answer, &session.context, true)
            .await;
        finish(answer, StopReason::Exhausted, score, &findings, &explored)
    }

    /// Push the session's findings and explored set back into the sandbox.
    async fn resync(&self, sandbox: &Sandbox, findings: &[Finding], explored: &ExploredSet) {
        let contents = findings.iter().map(|f| f.content.clone()).collect();
        if let Err(e) = sandbox.sync(contents, explored.to_vec()).await {
            warn!(error = %e, "Failed to sync sandbox state");
        }
    }

    /// Candidate answer from exploration findings. Falls back to the raw
    /// findings when the boss is unavailable.
    async fn synthesize_findings(&self, question: &str, findings: &[Finding]) -> String {
        let contents: Vec<String> = findings.iter().map(|f| f.content.clone()).collect();
        let prompt = prompts::findings_prompt(question, &contents);
        match self
            .propose(RequestKind::SynthesizeFindings, prompts::FINDINGS_SYSTEM, prompt)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => contents.join("\n"),
            Err(e) => {
                warn!(error = %e, "Findings synthesis failed, using raw findings");
                contents.join("\n")
            }
        }
    }

    /// Best-effort answer at exhaustion. Never fails.
    async fn synthesize_final(&self, question: &str, evidence: &[String]) -> String {
        let prompt = prompts::final_prompt(question, evidence);
        match self
            .propose(RequestKind::FinalSynthesis, prompts::FINAL_SYSTEM, prompt)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => fallback_answer(question, evidence),
            Err(e) => {
                warn!(error = %e, "Final synthesis failed, returning gathered evidence");
                fallback_answer(question, evidence)
            }
        }
    }
}

fn fallback_answer(question: &str, evidence: &[String]) -> String {
    if evidence.is_empty() {
        format!(
            "I wasn't able to find information about \"{question}\" in the reference text. \
             The text may not cover this question; try rephrasing it."
        )
    } else {
        let listed = evidence
            .iter()
            .map(|e| format!("- {}", e.replace('\n', " ")))
            .collect::<Vec<_>>()
            .join("\n");
        format!("I couldn't put together a final answer to \"{question}\". Here is what I found:\n\n{listed}")
    }
}
