//! Text quality scoring

use serde::{Deserialize, Serialize};

use crate::tables::CleanerTables;

/// Weights of the composite score
const WORD_RETENTION_WEIGHT: f64 = 0.3;
const CHAR_KEPT_WEIGHT: f64 = 0.2;
const MEDICAL_WEIGHT: f64 = 0.3;
const STRUCTURE_WEIGHT: f64 = 0.2;

/// Matched vocabulary terms needed for a full medical score
const MEDICAL_TERMS_FOR_FULL_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub quality_score: f64,
    pub word_retention: f64,
    pub char_reduction: f64,
    pub medical_score: f64,
    pub structure_score: f64,
    pub medical_terms_found: Vec<String>,
}

pub(crate) fn assess(original: &str, cleaned: &str, tables: &CleanerTables) -> QualityMetrics {
    if original.trim().is_empty() || cleaned.trim().is_empty() {
        return QualityMetrics::default();
    }

    let original_words = original.split_whitespace().count() as f64;
    let cleaned_words = cleaned.split_whitespace().count() as f64;
    let word_retention = cleaned_words / original_words;

    let original_chars = original.chars().count() as f64;
    let cleaned_chars = cleaned.chars().count() as f64;
    let char_reduction = 1.0 - cleaned_chars / original_chars;

    let lowered = cleaned.to_lowercase();
    let medical_terms_found: Vec<String> = tables
        .vocabulary
        .iter()
        .filter(|term| lowered.contains(term.as_str()))
        .cloned()
        .collect();
    let medical_score = (medical_terms_found.len() as f64 / MEDICAL_TERMS_FOR_FULL_SCORE).min(1.0);

    let structure_score = if tables.structure.is_empty() {
        0.0
    } else {
        let hits = tables.structure.iter().filter(|re| re.is_match(cleaned)).count();
        hits as f64 / tables.structure.len() as f64
    };

    let quality_score = (WORD_RETENTION_WEIGHT * word_retention
        + CHAR_KEPT_WEIGHT * (1.0 - char_reduction)
        + MEDICAL_WEIGHT * medical_score
        + STRUCTURE_WEIGHT * structure_score)
        .clamp(0.0, 1.0);

    QualityMetrics {
        quality_score,
        word_retention,
        char_reduction,
        medical_score,
        structure_score,
        medical_terms_found,
    }
}
