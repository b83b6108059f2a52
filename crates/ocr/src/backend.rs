//! OCR backend trait

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::types::{Fragment, OcrAuditInfo, OcrEngineType};

/// Text and confidence a backend reports for one image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendOutput {
    pub text: String,
    /// Mean over kept fragments, 0 when none were kept
    pub confidence: f32,
    pub fragments_kept: usize,
    pub fragments_total: usize,
}

/// A recognition engine the [`crate::TextRecognizer`] can drive.
pub trait OcrBackend: Send {
    fn engine_type(&self) -> OcrEngineType;

    /// Fragments at or below this confidence are discarded.
    fn confidence_floor(&self) -> f32;

    /// Recognizes every fragment in the image, in reading order.
    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<Fragment>, OcrError>;

    fn audit_info(&self) -> OcrAuditInfo;

    /// Joins the fragments above the floor.
    fn extract(&mut self, img: &DynamicImage) -> Result<BackendOutput, OcrError> {
        let fragments = self.recognize_image(img)?;
        Ok(summarize(&fragments, self.confidence_floor()))
    }
}

pub(crate) fn summarize(fragments: &[Fragment], floor: f32) -> BackendOutput {
    let kept: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.confidence > floor && !f.text.trim().is_empty())
        .collect();

    let confidence = if kept.is_empty() {
        0.0
    } else {
        kept.iter().map(|f| f.confidence).sum::<f32>() / kept.len() as f32
    };

    BackendOutput {
        text: kept
            .iter()
            .map(|f| f.text.trim())
            .collect::<Vec<_>>()
            .join(" "),
        confidence,
        fragments_kept: kept.len(),
        fragments_total: fragments.len(),
    }
}
