//! Pipeline result and error records

use docshield_rules::PiiMatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const PIPELINE_VERSION: &str = "1.0.0";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Preprocessing,
    Ocr,
    TextCleaning,
    PiiDetection,
    Redaction,
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Preprocessing => "preprocessing",
            Stage::Ocr => "ocr",
            Stage::TextCleaning => "text_cleaning",
            Stage::PiiDetection => "pii_detection",
            Stage::Redaction => "redaction",
            Stage::Pipeline => "pipeline",
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Stage::Input => ErrorKind::InputError,
            Stage::Preprocessing => ErrorKind::PreprocessingError,
            Stage::Ocr => ErrorKind::RecognitionError,
            Stage::TextCleaning => ErrorKind::CleaningError,
            Stage::PiiDetection => ErrorKind::DetectionError,
            Stage::Redaction => ErrorKind::RedactionError,
            Stage::Pipeline => ErrorKind::PipelineError,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    PreprocessingError,
    RecognitionError,
    CleaningError,
    DetectionError,
    RedactionError,
    PipelineError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputError => "input_error",
            ErrorKind::PreprocessingError => "preprocessing_error",
            ErrorKind::RecognitionError => "recognition_error",
            ErrorKind::CleaningError => "cleaning_error",
            ErrorKind::DetectionError => "detection_error",
            ErrorKind::RedactionError => "redaction_error",
            ErrorKind::PipelineError => "pipeline_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and outcome of one stage, plus whatever that stage reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    pub duration_seconds: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl StageMetadata {
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub input_file: String,
    pub pipeline_version: String,
    /// Stages that completed, in order
    pub processing_stages: Vec<Stage>,
    /// Every stage attempted
    pub stages: BTreeMap<Stage, StageMetadata>,
    pub total_duration_seconds: f64,
    pub success: bool,
}

impl ProcessingMetadata {
    pub fn new(input_file: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            processing_stages: Vec::new(),
            stages: BTreeMap::new(),
            total_duration_seconds: 0.0,
            success: false,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageMetadata> {
        self.stages.get(&stage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub cleaned_text: String,
    /// Sorted by start, non-overlapping
    pub pii_matches: Vec<PiiMatch>,
    pub metadata: ProcessingMetadata,
    pub redacted_image_path: Option<PathBuf>,
}

/// A mandatory stage failed. `diagnostic_info` holds the metadata gathered
/// up to the failure.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{failing_stage} stage failed: {message}")]
pub struct ErrorRecord {
    pub error_kind: ErrorKind,
    pub message: String,
    pub failing_stage: Stage,
    pub diagnostic_info: ProcessingMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(serde_json::to_string(&Stage::TextCleaning).unwrap(), "\"text_cleaning\"");
        assert_eq!(Stage::PiiDetection.to_string(), "pii_detection");
        assert_eq!(Stage::Ocr.error_kind(), ErrorKind::RecognitionError);
        assert_eq!(
            serde_json::to_string(&ErrorKind::InputError).unwrap(),
            "\"input_error\""
        );
    }

    #[test]
    fn test_stages_serialize_in_pipeline_order() {
        let mut metadata = ProcessingMetadata::new("scan.jpg");
        for stage in [Stage::PiiDetection, Stage::Input, Stage::Ocr] {
            metadata.stages.insert(stage, StageMetadata::default());
        }
        let json = serde_json::to_string(&metadata).unwrap();
        let input = json.find("\"input\"").unwrap();
        let ocr = json.find("\"ocr\"").unwrap();
        let pii = json.find("\"pii_detection\"").unwrap();
        assert!(input < ocr && ocr < pii);
        assert!(json.contains("\"pipeline_version\":\"1.0.0\""));
    }

    #[test]
    fn test_stage_details_flattened() {
        let mut details = Map::new();
        details.insert("matches_found".to_string(), Value::from(3));
        let stage = StageMetadata {
            duration_seconds: 0.5,
            success: true,
            error: None,
            details,
        };
        let value = serde_json::to_value(&stage).unwrap();
        assert_eq!(value["matches_found"], 3);
        assert!(value.get("error").is_none());

        let back: StageMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, stage);
    }

    #[test]
    fn test_error_record_display() {
        let record = ErrorRecord {
            error_kind: ErrorKind::InputError,
            message: "Input image not found: a.jpg".to_string(),
            failing_stage: Stage::Input,
            diagnostic_info: ProcessingMetadata::new("a.jpg"),
        };
        assert_eq!(record.to_string(), "input stage failed: Input image not found: a.jpg");
    }
}
