//! OCR text cleaning
//!
//! Normalizes whitespace, fixes common OCR character confusions, formats
//! medical units and times, strips scan artifacts, and scores the result.
//!
//! ```no_run
//! use docshield_text::TextCleaner;
//!
//! let cleaner = TextCleaner::with_builtin()?;
//! let (cleaned, meta) = cleaner.clean("Take  500 mg  paracetamol");
//! assert_eq!(cleaned, "Take 500mg paracetamol");
//! println!("quality {:.2}", meta.quality.quality_score);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod cleaner;
mod quality;
mod structured;
mod tables;

pub use cleaner::{normalize_whitespace, CleaningMetadata, CleaningPass, TextCleaner};
pub use quality::QualityMetrics;
pub use structured::StructuredInfo;
pub use tables::{CleanerTables, Context, CorrectionRule, ExtractionPatterns};
