use std::collections::HashSet;

/// Domain vocabulary surfaced as search hints when the question mentions it.
const DOMAIN_TERMS: &[&str] = &[
    "revenue", "profit", "income", "earnings", "sales", "cost", "expense", "margin", "growth",
    "loss", "EBITDA", "adjusted", "operating", "net", "gross", "cash flow", "product line", "Q1",
    "Q2", "Q3", "Q4", "quarter", "fiscal", "FY", "year", "total",
];

/// Words that mark a ranking or comparison question.
const RANKING_TERMS: &[&str] = &[
    "largest", "smallest", "biggest", "tiniest", "highest", "lowest", "tallest", "shortest",
    "first", "second", "third", "fourth", "fifth", "top", "bottom", "best", "worst", "most",
    "least", "maximum", "minimum", "greater", "lesser", "superior", "inferior", "leading",
    "trailing", "primary", "secondary",
];

/// Search hints for the exploration strategy: quoted phrases, then domain
/// terms present in the question, then year-like 4-digit tokens.
/// Case-insensitively de-duplicated, first occurrence wins.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords: Vec<String> = quoted_phrases(question);

    let lower = question.to_lowercase();
    for term in DOMAIN_TERMS {
        if lower.contains(&term.to_lowercase()) {
            keywords.push(term.to_string());
        }
    }

    for token in question.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
            keywords.push(token.to_string());
        }
    }

    let mut seen = HashSet::new();
    keywords.retain(|k| seen.insert(k.to_lowercase()));
    keywords
}

fn quoted_phrases(text: &str) -> Vec<String> {
    text.split('"')
        .skip(1)
        .step_by(2)
        .zip(text.split('"').skip(2))
        .map(|(inner, _)| inner)
        .filter(|inner| !inner.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the question asks for a ranking or comparison, in which case the
/// reader is told to keep qualifying context alongside raw values.
pub fn is_ranking_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    RANKING_TERMS.iter().any(|t| lower.contains(t))
}
