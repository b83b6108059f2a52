//! Image preprocessing and text recognition
//!
//! Two interchangeable backends sit behind [`OcrBackend`]: the Tesseract CLI
//! and PP-OCR over ONNX Runtime (cargo feature `paddle`, on by default).
//! [`TextRecognizer`] runs the preferred one and falls back to the other on
//! weak output.

mod backend;
mod error;
#[cfg(feature = "paddle")]
pub mod paddle;
mod postprocess;
mod preprocess;
mod recognizer;
mod tesseract;
mod types;

pub use backend::{BackendOutput, OcrBackend};
pub use error::OcrError;
pub use postprocess::postprocess;
pub use preprocess::{
    Dimensions, PreprocessMetadata, PreprocessOptions, PreprocessStep, Preprocessor,
};
pub use recognizer::{Attempt, Recognition, RecognitionMetadata, RecognizerOptions, TextRecognizer};
pub use tesseract::{get_tesseract_langs, get_tesseract_version, TesseractEngine};
pub use types::{BBox, Fragment, OcrAuditInfo, OcrEngineType, PaddleConfig, TesseractConfig};
