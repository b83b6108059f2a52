//! Rule-based PII detection.
//!
//! A fixed battery of categorized regular expressions runs over cleaned text.
//! Every candidate is validated, scored, and the overlapping ones are resolved
//! so the detector returns a sorted, non-overlapping sequence of [`PiiMatch`].

mod dedup;
mod detector;
mod offsets;
mod patterns;
mod scoring;
mod validate;

pub use dedup::resolve_overlaps;
pub use detector::PiiDetector;
pub use patterns::{PatternError, PatternSource, PatternTable};
pub use validate::{is_valid_phone, is_valid_ssn};

use serde::{Deserialize, Serialize};
use std::fmt;

/// PII category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Name,
    Address,
    Phone,
    MedicalId,
    Ssn,
    Dob,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 6] = [
        PiiCategory::Name,
        PiiCategory::Address,
        PiiCategory::Phone,
        PiiCategory::MedicalId,
        PiiCategory::Ssn,
        PiiCategory::Dob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::Name => "name",
            PiiCategory::Address => "address",
            PiiCategory::Phone => "phone",
            PiiCategory::MedicalId => "medical_id",
            PiiCategory::Ssn => "ssn",
            PiiCategory::Dob => "dob",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected PII span.
///
/// `start` and `end` are character offsets into the text the match was found
/// in, half-open. Fields are private so a match cannot be altered after the
/// detector produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiMatch {
    text: String,
    category: PiiCategory,
    confidence: f32,
    start: usize,
    end: usize,
}

impl PiiMatch {
    pub(crate) fn new(
        text: String,
        category: PiiCategory,
        confidence: f32,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            text,
            category,
            confidence: confidence.clamp(0.0, 1.0),
            start,
            end,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> PiiCategory {
        self.category
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Half-open interval overlap test
    pub fn overlaps(&self, other: &PiiMatch) -> bool {
        self.start < other.end && self.end > other.start
    }
}
