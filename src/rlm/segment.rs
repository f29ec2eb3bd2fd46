//! Structural segmentation of reference text into size-bounded units.
//!
//! Text is first cut at section header lines (`===`, `---`, `###`, `>>>`),
//! falling back to blank-line paragraphs when no header exists. Units are then
//! normalized left to right: oversized units are re-packed paragraph by
//! paragraph, undersized ones are folded into the previous segment, and a
//! fragment that fits nowhere is carried into the next unit.

use std::collections::VecDeque;

use serde::Serialize;

/// Lines starting with one of these open a new section.
const HEADER_MARKERS: &[&str] = &[">>>", "===", "---", "###"];

/// Separator inserted between joined blocks.
pub const JOIN: &str = "\n\n";
const JOIN_LEN: usize = 2;

/// Size constraints in characters. Expected `min < target < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentBounds {
    pub target: usize,
    pub max: usize,
    pub min: usize,
}

impl Default for SegmentBounds {
    fn default() -> Self {
        Self {
            target: 2500,
            max: 5000,
            min: 500,
        }
    }
}

/// An immutable, ordered slice of the reference text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub text: String,
    /// Length in characters.
    pub len: usize,
}

/// Split `text` into ordered segments.
///
/// Every segment is at most `bounds.max` characters and, except for the first
/// and the last, at least `bounds.min`. Only whitespace is ever normalized;
/// input with no visible content yields no segments.
pub fn segment(text: &str, bounds: &SegmentBounds) -> Vec<Segment> {
    let units = split_by_headers(text).unwrap_or_else(|| paragraphs(text));

    let mut normalizer = Normalizer::new(*bounds);
    for unit in units {
        normalizer.push_unit(unit);
    }

    normalizer
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, text)| Segment {
            index,
            len: char_len(&text),
            text,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    HEADER_MARKERS.iter().any(|m| trimmed.starts_with(m))
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
    lines.clear();
}

/// Blank-line separated paragraphs, trimmed, empties dropped.
fn paragraphs(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut lines = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut lines, &mut blocks);
        } else {
            lines.push(line);
        }
    }
    flush_paragraph(&mut lines, &mut blocks);
    blocks
}

/// One unit per header (header plus the paragraphs under it). Text before the
/// first header becomes its own unit. `None` when the text has no header.
fn split_by_headers(text: &str) -> Option<Vec<String>> {
    let mut units: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut saw_header = false;

    for line in text.lines() {
        if is_header(line) {
            flush_paragraph(&mut lines, &mut current);
            if !current.is_empty() {
                units.push(std::mem::take(&mut current));
            }
            current.push(line.trim().to_string());
            saw_header = true;
        } else if line.trim().is_empty() {
            flush_paragraph(&mut lines, &mut current);
        } else {
            lines.push(line);
        }
    }
    flush_paragraph(&mut lines, &mut current);
    if !current.is_empty() {
        units.push(current);
    }

    if !saw_header {
        return None;
    }
    Some(units.into_iter().map(|blocks| blocks.join(JOIN)).collect())
}

/// Cut `text` so the head holds at most `budget` characters and at least
/// `need`. Prefers the last whitespace inside the budget; otherwise cuts at
/// exactly `budget` characters.
fn split_head(text: &str, budget: usize, need: usize) -> (String, String) {
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let window = &text[..cut];

    if let Some(ws) = window.rfind(char::is_whitespace) {
        let head = window[..ws].trim_end();
        if !head.is_empty() && char_len(head) >= need.max(budget / 2) {
            return (head.to_string(), text[ws..].trim_start().to_string());
        }
    }
    (window.to_string(), text[cut..].trim_start().to_string())
}

/// Break a block longer than `max` into pieces of at most `max` characters.
fn split_to_fit(block: String, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = block;
    while char_len(&rest) > max {
        let (head, tail) = split_head(&rest, max, 0);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

struct Normalizer {
    bounds: SegmentBounds,
    out: Vec<String>,
    /// Undersized fragment that did not fit into the previous segment.
    carry: Option<String>,
}

impl Normalizer {
    fn new(bounds: SegmentBounds) -> Self {
        Self {
            bounds,
            out: Vec::new(),
            carry: None,
        }
    }

    fn push_unit(&mut self, unit: String) {
        let unit = match self.carry.take() {
            Some(mut carried) => {
                carried.push_str(JOIN);
                carried.push_str(&unit);
                carried
            }
            None => unit,
        };

        let len = char_len(&unit);
        if len > self.bounds.max {
            self.pack(&unit);
        } else if len >= self.bounds.min {
            self.out.push(unit);
        } else {
            self.place_small(unit);
        }
    }

    /// Merge into the previous segment when it stays within `max`; the very
    /// first fragment is kept as-is; anything else waits for the next unit.
    fn place_small(&mut self, piece: String) {
        let max = self.bounds.max;
        match self.out.last_mut() {
            None => self.out.push(piece),
            Some(last) if char_len(last) + JOIN_LEN + char_len(&piece) <= max => {
                last.push_str(JOIN);
                last.push_str(&piece);
            }
            Some(_) => self.carry = Some(piece),
        }
    }

    /// Greedy paragraph packing toward `target` for a unit over `max`.
    fn pack(&mut self, unit: &str) {
        let SegmentBounds { target, max, min } = self.bounds;
        let mut pending: VecDeque<String> = paragraphs(unit)
            .into_iter()
            .flat_map(|p| split_to_fit(p, max))
            .collect();

        let mut cur = String::new();
        let mut cur_len = 0;

        while let Some(piece) = pending.pop_front() {
            let piece_len = char_len(&piece);
            if cur.is_empty() {
                cur = piece;
                cur_len = piece_len;
                continue;
            }

            let joined = cur_len + JOIN_LEN + piece_len;
            if joined <= max && (cur_len < min || joined <= target) {
                cur.push_str(JOIN);
                cur.push_str(&piece);
                cur_len = joined;
                continue;
            }

            if cur_len >= min || cur_len + JOIN_LEN >= max {
                self.out.push(std::mem::take(&mut cur));
                cur = piece;
                cur_len = piece_len;
                continue;
            }

            // Short sub-unit and the next piece overflows max: top up with its head.
            let budget = max - cur_len - JOIN_LEN;
            let need = min.saturating_sub(cur_len + JOIN_LEN);
            let (head, rest) = split_head(&piece, budget, need);
            cur.push_str(JOIN);
            cur.push_str(&head);
            self.out.push(std::mem::take(&mut cur));
            cur_len = 0;
            if !rest.is_empty() {
                pending.push_front(rest);
            }
        }

        if !cur.is_empty() {
            if cur_len >= min {
                self.out.push(cur);
            } else {
                self.place_small(cur);
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        if let Some(rest) = self.carry.take() {
            let max = self.bounds.max;
            match self.out.last_mut() {
                Some(last) if char_len(last) + JOIN_LEN + char_len(&rest) <= max => {
                    last.push_str(JOIN);
                    last.push_str(&rest);
                }
                _ => self.out.push(rest),
            }
        }
        self.out
    }
}
