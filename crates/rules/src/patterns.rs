//! Pattern tables
//!
//! The tables are plain data compiled once and handed to the detector at
//! construction. Extra patterns can be supplied as [`PatternSource`] values
//! (for example from a JSON config file).

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::PiiCategory;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid {category} pattern `{pattern}`: {source}")]
    Invalid {
        category: PiiCategory,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Uncompiled pattern definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSource {
    pub category: PiiCategory,
    pub pattern: String,
    /// The pattern itself carries an explicit label ("SSN:", "Patient:")
    #[serde(default)]
    pub labeled: bool,
    /// Defaults to case-insensitive for every category except SSN
    #[serde(default)]
    pub case_insensitive: Option<bool>,
}

impl PatternSource {
    fn builtin(category: PiiCategory, pattern: &str, labeled: bool) -> Self {
        Self {
            category,
            pattern: pattern.to_string(),
            labeled,
            case_insensitive: None,
        }
    }

    fn compile(&self) -> Result<CompiledPattern, PatternError> {
        let case_insensitive = self
            .case_insensitive
            .unwrap_or(self.category != PiiCategory::Ssn);
        let regex = RegexBuilder::new(&self.pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| PatternError::Invalid {
                category: self.category,
                pattern: self.pattern.clone(),
                source,
            })?;
        Ok(CompiledPattern {
            category: self.category,
            regex,
            labeled: self.labeled,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub category: PiiCategory,
    pub regex: Regex,
    pub labeled: bool,
}

/// Immutable detection tables
#[derive(Debug, Clone)]
pub struct PatternTable {
    pub(crate) patterns: Vec<CompiledPattern>,
    /// Words that disqualify a name candidate
    pub(crate) name_stopwords: HashSet<String>,
    /// Keywords that raise name confidence when found near the match
    pub(crate) name_context_keywords: Vec<String>,
    pub(crate) phone_labels: Vec<String>,
    pub(crate) ssn_labels: Vec<String>,
    pub(crate) dosage_follow: Regex,
    pub(crate) phone_format: Regex,
    pub(crate) state_zip: Regex,
}

// Street type suffixes shared by the address patterns
const STREET_TYPES: &str =
    "street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|court|ct|place|pl|way|terrace|parkway|pkwy";

const NAME_STOPWORDS: &[&str] = &[
    // units and dose forms
    "mg", "ml", "mcg", "tab", "tabs", "tablet", "tablets", "capsule", "capsules", "syrup", "drops",
    "cream", "ointment", "injection", "inhaler", "dose", "dosage", "units",
    // instructions
    "take", "apply", "use", "inject", "daily", "twice", "thrice", "once", "morning", "evening",
    "night", "bedtime", "before", "after", "with", "meals", "food", "hours", "weeks", "days",
    "every", "refill", "refills", "directions",
    // form labels
    "patient", "name", "doctor", "date", "birth", "address", "phone", "medical", "record",
    "hospital", "clinic", "pharmacy", "prescription", "signature", "street", "avenue", "road",
];

const NAME_CONTEXT_KEYWORDS: &[&str] =
    &["patient", "doctor", "medical", "chart", "record", "dob", "age"];

impl PatternTable {
    /// Built-in English pattern battery
    pub fn builtin() -> Result<Self, PatternError> {
        Self::with_extra(&[])
    }

    /// Built-in battery followed by caller-supplied patterns.
    ///
    /// Extra patterns are evaluated after the built-in ones of every category.
    pub fn with_extra(extra: &[PatternSource]) -> Result<Self, PatternError> {
        let mut sources = builtin_sources();
        sources.extend(extra.iter().cloned());
        let patterns = sources
            .iter()
            .map(PatternSource::compile)
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("[Detector] compiled {} patterns", patterns.len());

        Ok(Self {
            patterns,
            name_stopwords: NAME_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            name_context_keywords: NAME_CONTEXT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            phone_labels: ["phone", "tel", "cell", "mobile", "fax"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ssn_labels: ["ssn", "social security"].iter().map(|s| s.to_string()).collect(),
            dosage_follow: internal_regex(
                PiiCategory::Name,
                r"(?i)^[\s,]*\d+(?:\.\d+)?\s*(?:mg|ml|mcg|g|tabs?|tablets?|capsules?|units?)\b",
            )?,
            phone_format: internal_regex(PiiCategory::Phone, r"^\(\d{3}\)\s?\d{3}-\d{4}$")?,
            state_zip: internal_regex(PiiCategory::Address, r"\b[A-Z]{2}\s+\d{5}\b")?,
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn pattern_count_for(&self, category: PiiCategory) -> usize {
        self.patterns.iter().filter(|p| p.category == category).count()
    }
}

fn internal_regex(category: PiiCategory, pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError::Invalid {
        category,
        pattern: pattern.to_string(),
        source,
    })
}

/// Ordered per category: labelled patterns first, the generic shape last.
/// Name shapes are wrapped in `(?-i:..)` so capitalisation stays significant
/// while the surrounding labels match in any case.
fn builtin_sources() -> Vec<PatternSource> {
    use PiiCategory::*;

    let street_address = format!(
        r"\b\d{{1,5}}[ \t]+(?:[A-Za-z0-9.]+[ \t]+){{0,4}}(?:{STREET_TYPES})\b\.?(?:,[ \t]*[A-Za-z][A-Za-z \t]*,[ \t]*[A-Za-z]{{2}}[ \t]+\d{{5}}(?:-\d{{4}})?)?"
    );

    vec![
        // ---- name ----
        PatternSource::builtin(
            Name,
            r"\b(?:mr|mrs|ms|dr|doctor)\.?[ \t]+((?-i:[A-Z][a-z]+[ \t]+[A-Z][a-z]+))\b",
            true,
        ),
        PatternSource::builtin(
            Name,
            r"\bpatient(?:[ \t]+name)?[ \t]*:[ \t]*((?-i:[A-Z][a-z]+[ \t]+[A-Z][a-z]+))\b",
            true,
        ),
        PatternSource::builtin(
            Name,
            r"\bname[ \t]*:[ \t]*((?-i:[A-Z][a-z]+[ \t]+[A-Z][a-z]+))\b",
            true,
        ),
        PatternSource::builtin(
            Name,
            r"\b((?-i:[A-Z][a-z]+[ \t]+[A-Z][a-z]+)),?[ \t]*(?:dob|age|born)\b",
            true,
        ),
        PatternSource::builtin(Name, r"\b((?-i:[A-Z][a-z]{2,}[ \t]+[A-Z][a-z]{2,}))\b", false),
        // ---- address ----
        PatternSource::builtin(
            Address,
            r"\baddress[ \t]*:[ \t]*([^\n:]{4,80}?)(?:[ \t]+[A-Za-z][A-Za-z ]{1,20}:|\n|$)",
            true,
        ),
        PatternSource::builtin(Address, &street_address, false),
        PatternSource::builtin(
            Address,
            r"\b(?-i:[A-Z][a-z]+)[ \t]*,[ \t]*(?-i:[A-Z]{2})[ \t]+\d{5}(?:-\d{4})?\b",
            false,
        ),
        // ---- phone ----
        PatternSource::builtin(
            Phone,
            r"\b(?:phone|tel|telephone|cell|mobile|fax)[ \t]*[:#]?[ \t]*([+(]?[0-9][0-9\-.() \t]{6,}[0-9])",
            true,
        ),
        PatternSource::builtin(
            Phone,
            r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b",
            false,
        ),
        // ---- medical_id ----
        PatternSource::builtin(
            MedicalId,
            r"\b(?:mrn|medical[ \t]+record(?:[ \t]+(?:number|no\.?))?|patient[ \t]+id|chart(?:[ \t]+(?:number|no\.?))?)[ \t]*[:#][ \t]*([A-Z0-9][A-Z0-9\-]{3,})\b",
            true,
        ),
        PatternSource::builtin(MedicalId, r"\b(?:mr|mrn)[ \t]*#?[ \t]*([A-Z0-9\-]{6,12})\b", false),
        // ---- ssn ----
        PatternSource::builtin(
            Ssn,
            r"SSN[ \t]*[:#]?[ \t]*(\d{3}[-\s]?\d{2}[-\s]?\d{4})\b",
            true,
        ),
        PatternSource::builtin(
            Ssn,
            r"(?i:social[ \t]+security)(?:[ \t]+(?i:number|no\.?))?[ \t]*:?[ \t]*(\d{3}[-\s]?\d{2}[-\s]?\d{4})\b",
            true,
        ),
        PatternSource::builtin(Ssn, r"\b\d{3}-\d{2}-\d{4}\b", false),
        PatternSource::builtin(Ssn, r"\b\d{3} \d{2} \d{4}\b", false),
        // ---- dob ----
        PatternSource::builtin(
            Dob,
            r"\b(?:dob|d\.o\.b\.?|date[ \t]+of[ \t]+birth)[ \t]*[:\-]?[ \t]*(\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2}))\b",
            true,
        ),
        PatternSource::builtin(
            Dob,
            r"\bborn(?:[ \t]+on)?[ \t]*:?[ \t]*(\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2}))\b",
            false,
        ),
    ]
}
