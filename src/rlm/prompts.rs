use super::oracle::Axis;
use super::quality::{QualityScore, Thresholds};

/// System prompt for the boss role in the direct strategy.
pub const BOSS_SYSTEM: &str = r#"You are the lead investigator in a question-answering loop. You cannot read the reference text yourself; a reader can, and it answers the focused questions you give it.

Each turn you see the user's question and everything the reader has told you so far. Then you either:
  - ask ONE new, specific question that moves the investigation forward, or
  - finish, by replying with a single line that starts with:
      FINAL_ANSWER: <your complete answer>

Rules:
  - Build on earlier answers. Never repeat a question that was already answered.
  - Target facts the reader can find in the text: names, figures, dates, definitions.
  - If an earlier FINAL_ANSWER was rejected, treat the rejection note as evidence and fix what it points at.
  - Only finish when the gathered evidence actually supports the answer.
"#;

/// Extra instructions for the boss role when it writes exploration code.
pub const EXPLORER_SYSTEM: &str = r#"

═══════════════════════════════════════════════════════
 EXPLORATION MODE
═══════════════════════════════════════════════════════

The reference text is too large to read at once. It has been split into segments and loaded into a persistent Python environment. You write short Python snippets that inspect segments and ask the reader about the promising ones.

  - Only print() output comes back to you. Variables persist between snippets.
  - Check `findings` before exploring more segments. Do not re-read explored segments.
  - Stop as soon as the findings answer the question.
"#;

/// System prompt for the reading role.
pub const READER_SYSTEM: &str = r#"You answer questions about the reference text you are given, and nothing else.

  - Answer exactly what is asked. Be precise and concise.
  - Quote or point at the passage that supports your answer.
  - If the text does not contain the answer, say so plainly. Never guess.
  - When a fact is a ranking, size or comparison, keep its qualifiers ("globally", "in the region", "by revenue", "as of 2023") next to the value.
"#;

/// Appended to a probe when the user's question ranks or compares things.
pub const QUALIFIER_SUFFIX: &str = " (Include any contextual qualifiers like 'globally', 'regionally', 'worldwide', 'in the industry', or descriptive phrases that add important context.)";

pub const INTERMEDIATE_SYSTEM: &str = "You write short preliminary answers from partial evidence.";

pub const FINDINGS_SYSTEM: &str = "You extract and aggregate data from findings. Ignore findings that say the data is not provided. Calculate totals when appropriate.";

pub const FINAL_SYSTEM: &str = "You write clear, complete answers grounded only in the evidence provided.";

/// How many findings the exploration prompt shows verbatim.
pub const RECENT_FINDINGS: usize = 3;
/// How many keywords the exploration prompt calls out as search hints.
pub const KEYWORD_HINTS: usize = 5;

fn joined_or(items: &[String], sep: &str, empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(sep)
    }
}

/// Ask the boss for the next probe (or a `FINAL_ANSWER:`).
pub fn probe_prompt(question: &str, evidence: &[String], iteration: u32, max_iterations: u32) -> String {
    format!(
        "Original question: {question}\n\n\
         Information gathered so far:\n{}\n\n\
         This is iteration {iteration}/{max_iterations}. What specific question should the reader answer next?\n\n\
         If the information above already answers the original question, reply with:\n\
         FINAL_ANSWER: <your complete answer>\n\n\
         Otherwise reply with one focused question and nothing else.",
        joined_or(evidence, "\n\n", "Nothing gathered yet."),
    )
}

/// What the boss needs to know to write the next exploration snippet.
#[derive(Debug, Clone)]
pub struct ExplorationView<'a> {
    pub question: &'a str,
    pub total_segments: usize,
    /// Indices already visited, ascending.
    pub explored: &'a [usize],
    pub findings: &'a [String],
    pub keywords: &'a [String],
    pub iteration: u32,
    pub max_iterations: u32,
}

pub fn exploration_prompt(view: &ExplorationView<'_>) -> String {
    let recent_start = view.findings.len().saturating_sub(RECENT_FINDINGS);
    let recent = joined_or(&view.findings[recent_start..], "\n", "No findings yet.");
    let hints = view
        .keywords
        .iter()
        .take(KEYWORD_HINTS)
        .map(|k| format!("'{k}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let remaining = view.total_segments.saturating_sub(view.explored.len());
    let visited = if view.explored.is_empty() {
        "none".to_string()
    } else {
        view.explored
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let q = view.question;

    format!(
        r#"You're solving: "{q}"

ENVIRONMENT (already loaded, no imports):
- segments: list of {total} text segments, in document order
- keywords: {keywords:?}
- findings: list of findings gathered so far ({found} entries)
- explored: list of segment indices already examined
- question: the question above
- ask_oracle(query, text): ask the reader about one piece of text; returns its answer

PROGRESS:
- Segments explored: {explored}/{total} ({remaining} remaining)
- Explored indices: {visited}
- Findings so far: {found}

Recent findings:
{recent}

Iteration {iteration}/{max_iterations}

STRATEGY:
1. Pick segments you have NOT explored yet, preferring ones that mention: {hints}
2. For each one, append its index to explored, call ask_oracle, print the result and append it to findings.
3. Look at no more than 3 segments per snippet.

EXAMPLE:
unexplored = [i for i in range(len(segments)) if i not in explored]
relevant = [i for i in unexplored if any(k.lower() in segments[i].lower() for k in keywords)] or unexplored
for i in relevant[:3]:
    explored.append(i)
    result = ask_oracle(question, segments[i])
    print(f"Segment {{i}}: {{result}}")
    findings.append(result)

If the findings already answer the question completely, reply with a single line instead of code:
FINAL: <your complete answer>

Otherwise reply with Python code only."#,
        total = view.total_segments,
        keywords = view.keywords,
        found = view.findings.len(),
        explored = view.explored.len(),
        iteration = view.iteration,
        max_iterations = view.max_iterations,
    )
}

pub fn intermediate_prompt(question: &str, evidence: &[String]) -> String {
    format!(
        "Question: {question}\n\nInformation so far:\n{}\n\n\
         Give a preliminary answer. Start with: \"Based on what I've gathered so far: ...\"",
        evidence.join("\n\n"),
    )
}

pub fn findings_prompt(question: &str, findings: &[String]) -> String {
    format!(
        r#"Question: {question}

Findings from exploring the document:
{}

INSTRUCTIONS:
1. Look for SPECIFIC data in the findings: numbers, names, amounts, dates.
2. If a finding says the data is "not provided" or "not mentioned", ignore it and use the others.
3. If several findings hold parts of the answer (e.g. revenue per product), combine them.
4. Calculate totals when the question asks for them and show the parts.

Synthesize a clear, complete answer:"#,
        findings.join("\n"),
    )
}

pub fn final_prompt(question: &str, evidence: &[String]) -> String {
    format!(
        "Question: {question}\n\nInformation gathered:\n{}\n\n\
         Provide the best answer this information supports. Say clearly what could not be determined.",
        joined_or(evidence, "\n\n", "Nothing was gathered."),
    )
}

/// Evidence note recorded when a proposed final answer fails the gate.
/// Names the check that failed.
pub fn rejection_notice(answer: &str, score: &QualityScore, thresholds: &Thresholds) -> String {
    let reason = if score.accuracy < thresholds.min_accuracy {
        format!(
            "accuracy {:.2} is below the required {:.2}. Verify the facts against the text",
            score.accuracy, thresholds.min_accuracy
        )
    } else {
        format!(
            "overall quality {:.2} is below the required {:.2} (accuracy {:.2} was fine). Make the answer more complete",
            score.overall, thresholds.early_stop, score.accuracy
        )
    };
    format!(
        "[REJECTED FINAL ANSWER] \"{answer}\" scored accuracy {:.2}, overall {:.2}: {reason} before proposing again.",
        score.accuracy, score.overall
    )
}

pub fn reader_prompt(question: &str, text: &str) -> String {
    format!("Reference text:\n{text}\n\nQuestion: {question}")
}

pub fn judge_system(axis: Axis) -> &'static str {
    match axis {
        Axis::Completeness => "You evaluate answer completeness. A complete answer directly provides what was asked, even if brief. Respond only with a number.",
        Axis::Accuracy => "You are a precise fact checker. Verify calculations and factual accuracy. Respond only with a number.",
        Axis::Confidence => "You evaluate how well an answer is supported by evidence. Respond only with a number.",
        Axis::Relevance => "You evaluate answer relevance. Respond only with a number.",
    }
}

pub const SECOND_OPINION_SYSTEM: &str = "You are reviewing an accuracy score. Be fair and precise. Respond only with a number.";

const NUMBER_ONLY: &str = "Respond ONLY with a number between 0.0 and 1.0. No explanation.";

pub fn judge_prompt(axis: Axis, question: &str, answer: &str, context: &str) -> String {
    match axis {
        Axis::Completeness => format!(
            r#"Evaluate if this answer COMPLETELY addresses the question.

Question: {question}
Answer: {answer}

For questions asking about "all" or a "total":
- 1.0 only if the answer covers every item and says so ("all 6 products", "every office")
- a comprehensive list without explicit confirmation scores at most 0.9
- partial lists score by coverage (most: 0.7, some: 0.5, few: 0.3)

For simple questions:
- 1.0 = directly provides the complete answer
- 0.7 = mostly complete
- 0.5 = partial
- 0.3 = barely addresses it
- 0.0 = does not answer

{NUMBER_ONLY}"#
        ),
        Axis::Accuracy => format!(
            r#"Evaluate if this answer is factually accurate based on the context.

Context (source of truth):
{context}

Answer to evaluate:
{answer}

Ignore wording and formatting. If a value is derived from the context (a sum, a difference), check the arithmetic.

- 1.0 = all facts correct
- 0.9 = very minor issues
- 0.7 = small errors or omissions
- 0.5 = mix of right and wrong
- 0.3 = mostly wrong
- 0.0 = completely wrong

{NUMBER_ONLY}"#
        ),
        Axis::Confidence => format!(
            r#"Evaluate how well-supported this answer is by the available information.

Question: {question}
Answer: {answer}
Context: {context}

- 1.0 = strong, explicit evidence in the context
- 0.8 = good evidence
- 0.6 = some evidence
- 0.4 = weak evidence
- 0.2 = minimal evidence
- 0.0 = pure speculation

{NUMBER_ONLY}"#
        ),
        Axis::Relevance => format!(
            r#"Evaluate the relevance of this answer to the question.

Question: {question}
Answer: {answer}

- 1.0 = directly addresses the question
- 0.7-0.9 = mostly relevant
- 0.4-0.6 = somewhat relevant
- 0.1-0.3 = barely relevant
- 0.0 = off-topic

{NUMBER_ONLY}"#
        ),
    }
}

pub fn second_opinion_prompt(answer: &str, context: &str, prior: f64) -> String {
    format!(
        "Double-check this accuracy evaluation.\n\nContext: {context}\nAnswer: {answer}\nPrevious score: {prior}\n\n\
         Is this answer actually incorrect, or was it scored too harshly?\n\
         Give a fair accuracy score from 0.0 to 1.0.\n\n{NUMBER_ONLY}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exploration_prompt_windows() {
        let findings: Vec<String> = (0..5).map(|i| format!("finding-{i}")).collect();
        let keywords: Vec<String> = (0..7).map(|i| format!("kw{i}")).collect();
        let prompt = exploration_prompt(&ExplorationView {
            question: "q?",
            total_segments: 10,
            explored: &[0, 3, 5, 7],
            findings: &findings,
            keywords: &keywords,
            iteration: 2,
            max_iterations: 5,
        });

        assert!(!prompt.contains("finding-1"));
        assert!(prompt.contains("finding-2") && prompt.contains("finding-4"));
        assert!(prompt.contains("'kw4'"));
        assert!(!prompt.contains("'kw5'"));
        assert!(prompt.contains("Segments explored: 4/10 (6 remaining)"));
        assert!(prompt.contains("Explored indices: 0, 3, 5, 7"));
        assert!(prompt.contains("Iteration 2/5"));
        assert!(prompt.contains("Segment {i}: {result}"));
    }

    #[test]
    fn test_probe_prompt_empty_evidence() {
        let prompt = probe_prompt("Who?", &[], 1, 3);
        assert!(prompt.contains("Nothing gathered yet."));
        assert!(prompt.contains("FINAL_ANSWER:"));
    }

    #[test]
    fn test_exploration_prompt_nothing_explored() {
        let prompt = exploration_prompt(&ExplorationView {
            question: "q?",
            total_segments: 3,
            explored: &[],
            findings: &[],
            keywords: &[],
            iteration: 1,
            max_iterations: 5,
        });
        assert!(prompt.contains("Explored indices: none"));
        assert!(prompt.contains("No findings yet."));
    }

    fn scored(accuracy: f64, overall: f64) -> QualityScore {
        QualityScore {
            completeness: 0.0,
            accuracy,
            confidence: 0.0,
            relevance: 0.0,
            overall,
        }
    }

    #[test]
    fn test_rejection_notice_names_failed_check() {
        let thresholds = Thresholds {
            min_accuracy: 0.7,
            early_stop: 0.8,
        };

        let note = rejection_notice("Paris", &scored(0.25, 0.4), &thresholds);
        assert!(note.starts_with("[REJECTED FINAL ANSWER] \"Paris\""));
        assert!(note.contains("accuracy 0.25 is below the required 0.70"));

        let note = rejection_notice("Paris", &scored(0.9, 0.75), &thresholds);
        assert!(note.contains("overall quality 0.75 is below the required 0.80"));
        assert!(!note.contains("accuracy 0.90 is below"));
    }
}
