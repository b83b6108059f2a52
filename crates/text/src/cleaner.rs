use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::quality::{assess, QualityMetrics};
use crate::structured::{extract, StructuredInfo};
use crate::tables::{CleanerTables, CorrectionRule};

/// Upper bound on correction, formatting and artifact rounds
const MAX_ROUNDS: usize = 8;

/// Cleaning passes, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningPass {
    WhitespaceNormalization,
    OcrCorrection,
    MedicalFormatting,
    ArtifactRemoval,
    FinalWhitespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningMetadata {
    pub original_length: usize,
    pub cleaned_length: usize,
    /// Passes that changed the text
    pub cleaning_steps: Vec<CleaningPass>,
    pub quality: QualityMetrics,
    pub structured_info: StructuredInfo,
}

/// OCR text cleaner
#[derive(Debug, Clone)]
pub struct TextCleaner {
    tables: CleanerTables,
}

impl TextCleaner {
    pub fn new(tables: CleanerTables) -> Self {
        Self { tables }
    }

    pub fn with_builtin() -> anyhow::Result<Self> {
        Ok(Self::new(CleanerTables::builtin()?))
    }

    pub fn tables(&self) -> &CleanerTables {
        &self.tables
    }

    /// Cleans `text` and reports quality metrics plus structured fields.
    pub fn clean(&self, text: &str) -> (String, CleaningMetadata) {
        let start = Instant::now();
        let (cleaned, cleaning_steps) = self.run_passes(text);
        let quality = self.assess_quality(text, &cleaned);
        let structured_info = extract(&cleaned, &self.tables.extraction);

        log::info!(
            "[Cleaner] {} -> {} chars, quality {:.2}, {} ms",
            text.chars().count(),
            cleaned.chars().count(),
            quality.quality_score,
            start.elapsed().as_millis()
        );

        let metadata = CleaningMetadata {
            original_length: text.chars().count(),
            cleaned_length: cleaned.chars().count(),
            cleaning_steps,
            quality,
            structured_info,
        };
        (cleaned, metadata)
    }

    /// The cleaning passes without metadata
    pub fn clean_text(&self, text: &str) -> String {
        self.run_passes(text).0
    }

    pub fn assess_quality(&self, original: &str, cleaned: &str) -> QualityMetrics {
        assess(original, cleaned, &self.tables)
    }

    pub fn extract_structured(&self, text: &str) -> StructuredInfo {
        extract(text, &self.tables.extraction)
    }

    fn run_passes(&self, text: &str) -> (String, Vec<CleaningPass>) {
        let mut current = text.to_string();
        let mut changed = Vec::new();

        let next = normalize_whitespace(&current);
        record(&mut current, &mut changed, CleaningPass::WhitespaceNormalization, next);

        // Removing an artifact can bring a dosage or time back together, so
        // the middle passes repeat until the text settles.
        for _ in 0..MAX_ROUNDS {
            let before = current.clone();
            let next = self.correct_ocr_errors(&current);
            record(&mut current, &mut changed, CleaningPass::OcrCorrection, next);
            let next = self.format_medical(&current);
            record(&mut current, &mut changed, CleaningPass::MedicalFormatting, next);
            let next = self.remove_artifacts(&current);
            record(&mut current, &mut changed, CleaningPass::ArtifactRemoval, next);
            if current == before {
                break;
            }
        }
        let next = normalize_whitespace(&current);
        record(&mut current, &mut changed, CleaningPass::FinalWhitespace, next);

        (current, changed)
    }

    pub(crate) fn correct_ocr_errors(&self, text: &str) -> String {
        self.tables
            .corrections
            .iter()
            .fold(text.to_string(), |acc, rule| {
                apply_correction(&acc, rule, &self.tables)
            })
    }

    pub(crate) fn format_medical(&self, text: &str) -> String {
        self.tables
            .formatting
            .iter()
            .fold(text.to_string(), |acc, (re, replacement)| {
                re.replace_all(&acc, replacement.as_str()).into_owned()
            })
    }

    /// Repeats until nothing matches. Every replacement shortens the text, so
    /// the loop terminates.
    pub(crate) fn remove_artifacts(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let stripped = self
                .tables
                .artifacts
                .iter()
                .fold(current.clone(), |acc, re| re.replace_all(&acc, " ").into_owned());
            let next = normalize_whitespace(&stripped);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

fn record(
    current: &mut String,
    changed: &mut Vec<CleaningPass>,
    pass: CleaningPass,
    next: String,
) {
    if next != *current {
        log::debug!("[Cleaner] {:?} changed the text", pass);
        if !changed.contains(&pass) {
            changed.push(pass);
        }
        *current = next;
    }
}

/// Collapses runs of spaces and tabs, trims lines and drops blank ones.
pub fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn apply_correction(text: &str, rule: &CorrectionRule, tables: &CleanerTables) -> String {
    if rule.find.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find(rule.find.as_str()) {
        let at = pos + rel;
        let end = at + rule.find.len();
        let before = text[..at].chars().next_back();
        let after = text[end..].chars().next();
        let accepted = rule.before.allows(before)
            && rule.after.allows(after)
            && !(rule.skip_units && starts_with_unit(&text[end..], &tables.unit_words))
            && !(rule.keep_known_words
                && tables.known_words.contains(&enclosing_word(text, at, end)));

        out.push_str(&text[pos..at]);
        if accepted {
            out.push_str(&rule.replace);
            pos = end;
        } else {
            let step = text[at..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&text[at..at + step]);
            pos = at + step;
        }
    }
    out.push_str(&text[pos..]);
    out
}

fn starts_with_unit(rest: &str, units: &HashSet<String>) -> bool {
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    !word.is_empty() && units.contains(&word)
}

/// Lowercased alphabetic run containing the byte range `[at, end)`
fn enclosing_word(text: &str, at: usize, end: usize) -> String {
    let head: Vec<char> = text[..at]
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .collect();
    let tail = text[end..].chars().take_while(|c| c.is_alphabetic());
    head.into_iter()
        .rev()
        .chain(text[at..end].chars())
        .chain(tail)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::with_builtin().unwrap()
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \t b  \n\n  c  "), "a b\nc");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_ocr_corrections() {
        let c = cleaner();
        assert_eq!(c.correct_ocr_errors("0mega 1nsulin 5albutamol"), "Omega Insulin Salbutamol");
        assert_eq!(c.correct_ocr_errors("|nsulin"), "Insulin");
        assert_eq!(c.correct_ocr_errors("mornring"), "momring");
        assert_eq!(c.correct_ocr_errors("he1lo ca5e"), "hello case");
        assert_eq!(c.correct_ocr_errors("vvater"), "water");
    }

    #[test]
    fn test_known_words_keep_rn() {
        let c = cleaner();
        assert_eq!(c.correct_ocr_errors("morning return"), "morning return");
        assert_eq!(c.correct_ocr_errors("Morning"), "Morning");
    }

    #[test]
    fn test_units_survive_corrections() {
        let c = cleaner();
        assert_eq!(c.correct_ocr_errors("5mg 1x 1st"), "5mg 1x 1st");
        assert_eq!(c.correct_ocr_errors("Take 5 MG"), "Take 5 mg");
        assert_eq!(c.correct_ocr_errors("TABLE"), "TABLE");
    }

    #[test]
    fn test_medical_formatting() {
        let c = cleaner();
        assert_eq!(c.format_medical("Take 500 mg"), "Take 500mg");
        assert_eq!(c.format_medical("10 ML syrup"), "10ml syrup");
        assert_eq!(c.format_medical("2tab"), "2 tab");
        assert_eq!(c.format_medical("2 tab"), "2 tab");
        assert_eq!(c.format_medical("2 x 14"), "2x14");
        assert_eq!(c.format_medical("8 : 30 am"), "8:30am");
        assert_eq!(c.format_medical("at 8 : 30"), "at 8:30");
        assert_eq!(c.format_medical("at 8 pm"), "at 8pm");
    }

    #[test]
    fn test_artifact_removal() {
        let c = cleaner();
        assert_eq!(c.remove_artifacts("Take . daily"), "Take daily");
        assert_eq!(c.remove_artifacts("Name ___ here"), "Name here");
        assert_eq!(c.remove_artifacts("top --- bottom"), "top bottom");
        assert_eq!(c.remove_artifacts("wait... done"), "wait done");
        assert_eq!(c.remove_artifacts("Take a b c now"), "Take now");
    }

    #[test]
    fn test_artifact_removal_reaches_fixpoint() {
        let c = cleaner();
        let once = c.remove_artifacts("a . , b c d ; e");
        assert_eq!(c.remove_artifacts(&once), once);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let c = cleaner();
        let samples = [
            "  Patient:   John  Doe \n\n Take 500 mg  paracetamol ... twice daily ---",
            "Rx: Amoxicillin 250 mg , 3 x 7 days | morning 8 : 30 am",
            "",
            "___ . ___",
            "Take 500 . mg daily",
            "2 . x 3 pack",
            "at 8 . pm",
        ];
        for sample in samples {
            let once = c.clean_text(sample);
            assert_eq!(c.clean_text(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_artifact_removal_rejoins_units() {
        let c = cleaner();
        assert_eq!(c.clean_text("Take 500 . mg daily"), "Take 500mg daily");
        assert_eq!(c.clean_text("2 . x 3 pack"), "2x3 pack");
        assert_eq!(c.clean_text("at 8 . pm"), "at 8pm");
    }

    #[test]
    fn test_clean_metadata() {
        let c = cleaner();
        let (cleaned, meta) = c.clean("Take  500 mg paracetamol twice daily");
        assert_eq!(cleaned, "Take 500mg paracetamol twice daily");
        assert_eq!(
            meta.cleaning_steps,
            vec![CleaningPass::WhitespaceNormalization, CleaningPass::MedicalFormatting]
        );
        assert_eq!(meta.cleaned_length, cleaned.chars().count());
        assert!(meta.quality.quality_score > 0.0);
        assert_eq!(meta.structured_info.dosages, vec!["500mg"]);
    }

    #[test]
    fn test_clean_empty() {
        let c = cleaner();
        let (cleaned, meta) = c.clean("");
        assert!(cleaned.is_empty());
        assert!(meta.cleaning_steps.is_empty());
        assert_eq!(meta.quality.quality_score, 0.0);
    }
}
