//! Pipeline orchestration
//!
//! [`Pipeline`] drives one JPEG through preprocessing, recognition, cleaning
//! and PII detection, producing a [`PipelineResult`] or an [`ErrorRecord`]
//! tagged with the stage that failed. [`output`] turns either into the JSON
//! documents written next to the redacted image.

mod error;
pub mod output;
mod pipeline;
mod types;

pub use error::{CoreError, Result};
pub use output::{
    pii_summary, render_error_json, render_result_json, save_error, save_results, PiiSummary,
    SavedFiles,
};
pub use pipeline::{
    load_jpeg, BatchItem, BatchReport, Pipeline, PipelineOptions, ProcessOptions,
};
pub use types::{
    ErrorKind, ErrorRecord, PipelineResult, ProcessingMetadata, Stage, StageMetadata,
    PIPELINE_VERSION,
};
