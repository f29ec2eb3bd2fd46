/// Final-answer prefix understood by the direct strategy.
pub const FINAL_ANSWER_PREFIX: &str = "FINAL_ANSWER:";
/// Final-answer prefix understood by the exploration strategy.
pub const FINAL_PREFIX: &str = "FINAL:";

/// Boss reply in the direct strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeDirective {
    /// Proposed final answer; still subject to the quality gate.
    Final(String),
    /// Focused question for the reader.
    Probe(String),
}

impl ProbeDirective {
    /// Only `FINAL_ANSWER:` ends the loop; anything else, `FINAL:`
    /// included, is a probe.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.strip_prefix(FINAL_ANSWER_PREFIX) {
            Some(answer) => ProbeDirective::Final(answer.trim().to_string()),
            None => ProbeDirective::Probe(trimmed.to_string()),
        }
    }
}

/// Boss reply in the exploration strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeDirective {
    Final(String),
    /// Snippet to run in the sandbox.
    Code(String),
}

impl CodeDirective {
    /// Only `FINAL:` ends the loop; anything else is code, taken from the
    /// first fenced block when there is one.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if let Some(answer) = trimmed.strip_prefix(FINAL_PREFIX) {
            return CodeDirective::Final(answer.trim().to_string());
        }

        match extract_code_block(trimmed) {
            Some(code) => CodeDirective::Code(code),
            None => CodeDirective::Code(strip_fences(trimmed)),
        }
    }

    #[cfg(test)]
    fn code(&self) -> Option<&str> {
        match self {
            CodeDirective::Code(s) => Some(s),
            CodeDirective::Final(_) => None,
        }
    }
}

/// Extract code from the first ```repl, ```python, ```py or bare ``` block.
fn extract_code_block(input: &str) -> Option<String> {
    let start_idx = input.find("```")?;
    let after_tag = &input[start_idx + 3..];

    // The rest of the opening fence line is the language tag.
    let (tag, code_region) = match after_tag.find('\n') {
        Some(i) => (after_tag[..i].trim(), &after_tag[i + 1..]),
        None => return None,
    };
    if !matches!(tag, "" | "repl" | "python" | "py") {
        return None;
    }

    let end = code_region.find("```").unwrap_or(code_region.len());
    let code = code_region[..end].trim();

    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Drop stray fence lines from a reply that has no well-formed block.
fn strip_fences(input: &str) -> String {
    input
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_answer() {
        assert_eq!(
            ProbeDirective::parse("  FINAL_ANSWER: The answer is 42\n"),
            ProbeDirective::Final("The answer is 42".into())
        );
    }

    #[test]
    fn test_parse_probe() {
        let d = ProbeDirective::parse("What was Q3 revenue?");
        assert_eq!(d, ProbeDirective::Probe("What was Q3 revenue?".into()));
    }

    #[test]
    fn test_prefixes_not_interchangeable() {
        assert!(matches!(ProbeDirective::parse("FINAL: 42"), ProbeDirective::Probe(_)));
        assert!(matches!(CodeDirective::parse("FINAL_ANSWER: 42"), CodeDirective::Code(_)));
        assert_eq!(CodeDirective::parse("FINAL: 42"), CodeDirective::Final("42".into()));
    }

    #[test]
    fn test_parse_code_block() {
        let input = "Let me check:\n```repl\nprint('hello')\n```\n";
        assert_eq!(CodeDirective::parse(input).code(), Some("print('hello')"));
    }

    #[test]
    fn test_parse_python_block() {
        let input = "```python\nx = 1 + 2\nprint(x)\n```";
        assert_eq!(CodeDirective::parse(input).code(), Some("x = 1 + 2\nprint(x)"));
    }

    #[test]
    fn test_parse_bare_fence() {
        let input = "```\nprint(len(segments))\n```";
        assert_eq!(CodeDirective::parse(input).code(), Some("print(len(segments))"));
    }

    #[test]
    fn test_unfenced_code_taken_whole() {
        let input = "for s in segments[:2]:\n    print(len(s))";
        assert_eq!(CodeDirective::parse(input).code(), Some(input));
    }

    #[test]
    fn test_unclosed_fence_stripped() {
        let input = "```python";
        assert_eq!(CodeDirective::parse(input).code(), Some(""));
        let input = "x = 1\n```";
        assert_eq!(CodeDirective::parse(input).code(), Some("x = 1"));
    }
}
