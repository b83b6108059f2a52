use std::time::Instant;

use crate::dedup::resolve_overlaps;
use crate::offsets::CharOffsets;
use crate::patterns::{PatternError, PatternTable};
use crate::scoring::{score, Candidate};
use crate::validate::accept;
use crate::PiiMatch;

/// How much trailing text the name validator sees
const FOLLOW_WINDOW: usize = 16;

/// PII detector over cleaned text
#[derive(Debug, Clone)]
pub struct PiiDetector {
    table: PatternTable,
}

impl PiiDetector {
    pub fn new(table: PatternTable) -> Self {
        Self { table }
    }

    /// Detector over the built-in pattern battery
    pub fn with_builtin() -> Result<Self, PatternError> {
        Ok(Self::new(PatternTable::builtin()?))
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Runs every pattern and returns matches sorted by start, non-overlapping.
    pub fn detect(&self, text: &str) -> Vec<PiiMatch> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let start = Instant::now();
        let offsets = CharOffsets::new(text);
        let mut candidates = Vec::new();

        for pattern in &self.table.patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(span) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                let Some((value_start, value_end)) = trim_span(text, span.start(), span.end())
                else {
                    continue;
                };
                let value = &text[value_start..value_end];
                let following: String = text[value_end..].chars().take(FOLLOW_WINDOW).collect();
                if !accept(pattern.category, value, &following, &self.table) {
                    log::trace!("[Detector] rejected {} candidate", pattern.category);
                    continue;
                }

                let candidate = Candidate {
                    category: pattern.category,
                    value,
                    start: value_start,
                    end: value_end,
                    labeled: pattern.labeled,
                };
                let confidence = score(&candidate, text, &self.table);
                candidates.push(PiiMatch::new(
                    value.to_string(),
                    pattern.category,
                    confidence,
                    offsets.char_at(value_start),
                    offsets.char_at(value_end),
                ));
            }
        }

        let candidate_count = candidates.len();
        let matches = resolve_overlaps(candidates);
        log::info!(
            "[Detector] {} candidates, {} matches in {} ms",
            candidate_count,
            matches.len(),
            start.elapsed().as_millis()
        );
        matches
    }
}

/// Strips surrounding whitespace and trailing separators from a byte span.
fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';'));
    let new_start = start + leading;
    let new_end = start + trimmed.len();
    (new_start < new_end).then_some((new_start, new_end))
}
