//! JSON documents for results and errors

use chrono::{SecondsFormat, Utc};
use docshield_rules::{PiiCategory, PiiMatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{ErrorKind, ErrorRecord, PipelineResult, ProcessingMetadata, Stage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiSummary {
    pub total_matches: usize,
    pub by_type: BTreeMap<PiiCategory, usize>,
    pub confidence_stats: ConfidenceStats,
}

pub fn pii_summary(matches: &[PiiMatch]) -> PiiSummary {
    if matches.is_empty() {
        return PiiSummary::default();
    }

    let mut by_type = BTreeMap::new();
    for m in matches {
        *by_type.entry(m.category()).or_insert(0) += 1;
    }

    let confidences: Vec<f64> = matches.iter().map(|m| m.confidence() as f64).collect();
    PiiSummary {
        total_matches: matches.len(),
        by_type,
        confidence_stats: ConfidenceStats {
            average: confidences.iter().sum::<f64>() / confidences.len() as f64,
            min: confidences.iter().copied().fold(f64::INFINITY, f64::min),
            max: confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        },
    }
}

#[derive(Serialize)]
struct Position {
    start: usize,
    end: usize,
}

#[derive(Serialize)]
struct MatchEntry<'a> {
    text: &'a str,
    #[serde(rename = "type")]
    category: PiiCategory,
    confidence: f32,
    position: Position,
}

impl<'a> From<&'a PiiMatch> for MatchEntry<'a> {
    fn from(m: &'a PiiMatch) -> Self {
        Self {
            text: m.text(),
            category: m.category(),
            confidence: m.confidence(),
            position: Position {
                start: m.start(),
                end: m.end(),
            },
        }
    }
}

#[derive(Serialize)]
struct ResultDocument<'a> {
    success: bool,
    original_text: &'a str,
    pii_matches: Vec<MatchEntry<'a>>,
    pii_summary: PiiSummary,
    processing_metadata: &'a ProcessingMetadata,
    redacted_image_path: Option<&'a Path>,
    generated_at: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    kind: ErrorKind,
    message: &'a str,
    stage: Stage,
    diagnostic_info: &'a ProcessingMetadata,
}

#[derive(Serialize)]
struct ErrorDocument<'a> {
    success: bool,
    error: ErrorBody<'a>,
    generated_at: String,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn render_result_json(result: &PipelineResult) -> Result<String> {
    let document = ResultDocument {
        success: true,
        original_text: &result.cleaned_text,
        pii_matches: result.pii_matches.iter().map(MatchEntry::from).collect(),
        pii_summary: pii_summary(&result.pii_matches),
        processing_metadata: &result.metadata,
        redacted_image_path: result.redacted_image_path.as_deref(),
        generated_at: now(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn render_error_json(record: &ErrorRecord) -> Result<String> {
    let document = ErrorDocument {
        success: false,
        error: ErrorBody {
            kind: record.error_kind,
            message: &record.message,
            stage: record.failing_stage,
            diagnostic_info: &record.diagnostic_info,
        },
        generated_at: now(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Files written for one image
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFiles {
    pub json: PathBuf,
    pub redacted_image: Option<PathBuf>,
}

/// Writes `<dir>/<stem>_results.json`.
pub fn save_results(result: &PipelineResult, dir: &Path, stem: &str) -> Result<SavedFiles> {
    let json = write_document(dir, stem, &render_result_json(result)?)?;
    Ok(SavedFiles {
        json,
        redacted_image: result.redacted_image_path.clone(),
    })
}

/// Same file name as [`save_results`], holding the error document.
pub fn save_error(record: &ErrorRecord, dir: &Path, stem: &str) -> Result<PathBuf> {
    write_document(dir, stem, &render_error_json(record)?)
}

fn write_document(dir: &Path, stem: &str, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_results.json", stem));
    std::fs::write(&path, contents)?;
    log::info!("[Pipeline] results saved to {}", path.display());
    Ok(path)
}
