//! Confidence heuristics
//!
//! Each category starts from a base score; bonuses are additive and the
//! total is clamped to 1.0.

use crate::offsets::{context_window, preceding};
use crate::patterns::PatternTable;
use crate::PiiCategory;

/// Radius for the medical keyword search around names
const NAME_CONTEXT_RADIUS: usize = 50;
/// How far back a label may sit before an unlabelled match
const LABEL_RADIUS: usize = 20;

/// Raw candidate as seen by the scorer
pub(crate) struct Candidate<'a> {
    pub category: PiiCategory,
    pub value: &'a str,
    /// Byte range of `value` in `text`
    pub start: usize,
    pub end: usize,
    pub labeled: bool,
}

pub(crate) fn score(candidate: &Candidate<'_>, text: &str, table: &PatternTable) -> f32 {
    let value = candidate.value;
    let total: f32 = match candidate.category {
        PiiCategory::Name => {
            let mut score = 0.5;
            if candidate.labeled {
                score += 0.3;
            }
            let window = context_window(text, candidate.start, candidate.end, NAME_CONTEXT_RADIUS)
                .to_lowercase();
            let near_keyword = window
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| table.name_context_keywords.iter().any(|k| k == word));
            if near_keyword {
                score += 0.2;
            }
            if value.split_whitespace().count() >= 2 {
                score += 0.1;
            }
            score
        }
        PiiCategory::Address => {
            let mut score = 0.6;
            if value.chars().any(|c| c.is_ascii_digit()) {
                score += 0.2;
            }
            if table.state_zip.is_match(value) {
                score += 0.2;
            }
            score
        }
        PiiCategory::Phone => {
            let mut score = 0.7;
            if candidate.labeled || label_before(text, candidate.start, &table.phone_labels) {
                score += 0.2;
            }
            if table.phone_format.is_match(value) {
                score += 0.1;
            }
            score
        }
        PiiCategory::MedicalId => {
            if candidate.labeled {
                0.9
            } else {
                0.8
            }
        }
        PiiCategory::Ssn => {
            let mut score = 0.9;
            if candidate.labeled || label_before(text, candidate.start, &table.ssn_labels) {
                score += 0.1;
            }
            score
        }
        PiiCategory::Dob => {
            if candidate.labeled {
                0.95
            } else {
                0.85
            }
        }
    };
    total.clamp(0.0, 1.0)
}

fn label_before(text: &str, start: usize, labels: &[String]) -> bool {
    let before = preceding(text, start, LABEL_RADIUS).to_lowercase();
    labels.iter().any(|label| before.contains(label.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(
        text: &'a str,
        value: &'a str,
        category: PiiCategory,
        labeled: bool,
    ) -> Candidate<'a> {
        let start = text.find(value).unwrap();
        Candidate {
            category,
            value,
            start,
            end: start + value.len(),
            labeled,
        }
    }

    #[test]
    fn test_name_bonuses_stack_and_clamp() {
        let table = PatternTable::builtin().unwrap();
        let text = "Patient: John Doe";
        let c = candidate(text, "John Doe", PiiCategory::Name, true);
        assert!((score(&c, text, &table) - 1.0).abs() < 1e-6);

        let text = "met John Doe yesterday";
        let c = candidate(text, "John Doe", PiiCategory::Name, false);
        assert!((score(&c, text, &table) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_name_keyword_must_be_whole_word() {
        let table = PatternTable::builtin().unwrap();
        let text = "dosage page for John Doe";
        let c = candidate(text, "John Doe", PiiCategory::Name, false);
        assert!((score(&c, text, &table) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_phone_label_in_context() {
        let table = PatternTable::builtin().unwrap();
        let text = "Tel (555) 123-4567";
        let c = candidate(text, "(555) 123-4567", PiiCategory::Phone, false);
        assert!((score(&c, text, &table) - 1.0).abs() < 1e-6);

        let text = "call 555.123.4567";
        let c = candidate(text, "555.123.4567", PiiCategory::Phone, false);
        assert!((score(&c, text, &table) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_address_state_zip_bonus() {
        let table = PatternTable::builtin().unwrap();
        let text = "123 Main St, Springfield, IL 62704";
        let c = candidate(text, text, PiiCategory::Address, false);
        assert!((score(&c, text, &table) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ssn_label_bonus() {
        let table = PatternTable::builtin().unwrap();
        let text = "SSN 123-45-6789";
        let c = candidate(text, "123-45-6789", PiiCategory::Ssn, false);
        assert!((score(&c, text, &table) - 1.0).abs() < 1e-6);

        let text = "ref 123-45-6789";
        let c = candidate(text, "123-45-6789", PiiCategory::Ssn, false);
        assert!((score(&c, text, &table) - 0.9).abs() < 1e-6);
    }
}
