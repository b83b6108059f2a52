//! Cleaner tables
//!
//! Correction rules, formatting rewrites, artifact patterns and the medical
//! vocabulary. Built once, then owned by a [`crate::TextCleaner`].

use anyhow::{Context as _, Result};
use regex::Regex;
use std::collections::HashSet;

/// Neighbour condition for a correction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Any,
    /// Start/end of text or a non-word character
    Boundary,
    /// ASCII letter
    Letter,
    /// ASCII lowercase letter
    Lower,
}

impl Context {
    pub(crate) fn allows(self, neighbour: Option<char>) -> bool {
        match self {
            Context::Any => true,
            Context::Boundary => neighbour.map_or(true, |c| !is_word_char(c)),
            Context::Letter => neighbour.is_some_and(|c| c.is_ascii_alphabetic()),
            Context::Lower => neighbour.is_some_and(|c| c.is_ascii_lowercase()),
        }
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Literal substitution guarded by the characters on either side.
#[derive(Debug, Clone)]
pub struct CorrectionRule {
    pub find: String,
    pub replace: String,
    pub before: Context,
    pub after: Context,
    /// Leave the match alone when the letters after it spell a unit ("5mg")
    pub skip_units: bool,
    /// Leave the match alone inside a word from the known-word list
    pub keep_known_words: bool,
}

impl CorrectionRule {
    fn new(find: &str, replace: &str, before: Context, after: Context) -> Self {
        Self {
            find: find.to_string(),
            replace: replace.to_string(),
            before,
            after,
            skip_units: false,
            keep_known_words: false,
        }
    }

    fn within_words(find: &str, replace: &str) -> Self {
        Self {
            keep_known_words: true,
            ..Self::new(find, replace, Context::Lower, Context::Lower)
        }
    }

    fn leading_digit(find: &str, replace: &str) -> Self {
        Self {
            skip_units: true,
            ..Self::new(find, replace, Context::Boundary, Context::Letter)
        }
    }
}

/// Diagnostic extraction patterns
#[derive(Debug, Clone)]
pub struct ExtractionPatterns {
    pub medications: Regex,
    pub dosages: Regex,
    pub times: Regex,
    pub dates: Regex,
    pub quantities: Regex,
}

#[derive(Debug, Clone)]
pub struct CleanerTables {
    pub corrections: Vec<CorrectionRule>,
    /// Regex rewrites, `$n` replacement syntax
    pub formatting: Vec<(Regex, String)>,
    /// Each match is replaced by a single space
    pub artifacts: Vec<Regex>,
    pub vocabulary: Vec<String>,
    pub structure: Vec<Regex>,
    pub unit_words: HashSet<String>,
    /// Lowercased words the mid-word corrections must not touch
    pub known_words: HashSet<String>,
    pub extraction: ExtractionPatterns,
}

const VOCABULARY: &[&str] = &[
    // drugs
    "paracetamol", "ibuprofen", "aspirin", "amoxicillin", "metformin", "atorvastatin",
    "omeprazole", "simvastatin", "ramipril", "amlodipine", "levothyroxine", "lansoprazole",
    "bendroflumethiazide", "salbutamol", "prednisolone", "warfarin", "furosemide", "bisoprolol",
    "clopidogrel",
    // forms
    "dose", "dosage", "tablet", "capsule", "syrup", "injection", "cream", "ointment", "drops",
    "spray", "inhaler", "patch", "suppository",
    // schedule
    "morning", "evening", "night", "daily", "twice", "thrice", "weekly", "monthly", "before",
    "after", "meals", "food", "empty", "stomach",
    // care
    "patient", "doctor", "physician", "nurse", "clinic", "hospital", "prescription",
    "medication", "treatment", "therapy", "diagnosis",
];

const UNIT_WORDS: &[&str] = &[
    "mg", "ml", "mcg", "g", "kg", "l", "iu", "u", "tab", "tabs", "x", "am", "pm", "st", "nd", "rd",
    "th", "hr", "hrs", "h", "d", "wk", "wks",
];

/// Real words containing "rn"
const RN_WORDS: &[&str] = &[
    "alternate", "cavern", "concern", "cornea", "eastern", "eternal", "external", "fraternal",
    "government", "hernia", "infernal", "intern", "internal", "journal", "kernel", "lantern",
    "maternal", "modern", "morning", "northern", "nocturnal", "paternal", "pattern", "return",
    "southern", "sternum", "tavern", "western",
];

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid cleaner pattern `{pattern}`"))
}

impl CleanerTables {
    pub fn builtin() -> Result<Self> {
        use Context::*;

        let corrections = vec![
            CorrectionRule::leading_digit("0", "O"),
            CorrectionRule::new("0", "o", Letter, Boundary),
            CorrectionRule::leading_digit("1", "I"),
            CorrectionRule::new("1", "l", Letter, Letter),
            CorrectionRule::leading_digit("5", "S"),
            CorrectionRule::new("5", "s", Letter, Letter),
            CorrectionRule::new("|", "I", Any, Any),
            CorrectionRule::within_words("rn", "m"),
            CorrectionRule::new("vv", "w", Any, Any),
            CorrectionRule::new("MG", "mg", Boundary, Boundary),
            CorrectionRule::new("ML", "ml", Boundary, Boundary),
            CorrectionRule::new("TAB", "tab", Boundary, Boundary),
        ];

        let formatting = [
            (r"(?i)\b(\d+)[ \t]*mg\b", "${1}mg"),
            (r"(?i)\b(\d+)[ \t]*ml\b", "${1}ml"),
            (r"(?i)\b(\d+)[ \t]*tab\b", "${1} tab"),
            (r"(?i)(\d+)[ \t]*x[ \t]*(\d+)", "${1}x${2}"),
            (r"(?i)(\d{1,2})[ \t]*:[ \t]*(\d{2})[ \t]*(am|pm)\b", "${1}:${2}${3}"),
            (r"(\d{1,2})[ \t]*:[ \t]*(\d{2})", "${1}:${2}"),
            (r"(?i)(\d{1,2})[ \t]+(am|pm)\b", "${1}${2}"),
        ]
        .iter()
        .map(|(pattern, replacement)| Ok((compile(pattern)?, replacement.to_string())))
        .collect::<Result<Vec<_>>>()?;

        let artifacts = [
            r"\s[^\w\s]\s",
            r"\b[A-Za-z]\s+[A-Za-z]\s+[A-Za-z]\b",
            r"_{2,}",
            r"-{3,}",
            r"\.{3,}",
        ]
        .iter()
        .map(|p| compile(p))
        .collect::<Result<Vec<_>>>()?;

        let structure = [
            r"\d+mg",
            r"\d+ml",
            r"\d+tab",
            r"\d{1,2}:\d{2}",
            r"\d{1,2}/\d{1,2}",
        ]
        .iter()
        .map(|p| compile(p))
        .collect::<Result<Vec<_>>>()?;

        let extraction = ExtractionPatterns {
            medications: compile(r"\b[A-Z][a-z]{3,}(?:in|ol|am|ide|ine|ate)\b")?,
            dosages: compile(r"(?i)\b\d+(?:\.\d+)?[ \t]*(?:mg|ml|mcg|g|units?|iu)\b")?,
            times: compile(
                r"(?i)\b\d{1,2}:\d{2}(?:[ \t]*(?:am|pm))?|\b\d{1,2}[ \t]*(?:am|pm)\b|\b(?:morning|evening|night|noon|bedtime)\b|\b(?:once|twice|thrice)(?:[ \t]+(?:a[ \t]+)?day|[ \t]+daily)?\b|\bdaily\b",
            )?,
            dates: compile(
                r"(?i)\b\d{1,2}/\d{1,2}/\d{2,4}\b|\b\d{1,2}-\d{1,2}-\d{2,4}\b|\b\d{1,2}[ \t]+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[ \t]+\d{2,4}\b",
            )?,
            quantities: compile(
                r"(?i)\b\d+[ \t]*x[ \t]*\d+\b|\b\d+[ \t]*(?:tablets?|tabs?|capsules?|packs?|bottles?|box(?:es)?)\b",
            )?,
        };

        Ok(Self {
            corrections,
            formatting,
            artifacts,
            vocabulary: VOCABULARY.iter().map(|s| s.to_string()).collect(),
            structure,
            unit_words: UNIT_WORDS.iter().map(|s| s.to_string()).collect(),
            known_words: VOCABULARY
                .iter()
                .chain(RN_WORDS)
                .map(|s| s.to_string())
                .collect(),
            extraction,
        })
    }
}
