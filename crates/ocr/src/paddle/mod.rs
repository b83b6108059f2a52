//! PP-OCR backend over ONNX Runtime

mod det;
mod rec;
mod tensor;
mod threading;

use image::DynamicImage;
use std::path::Path;
use std::time::Instant;

use crate::backend::OcrBackend;
use crate::error::OcrError;
use crate::types::{BBox, Fragment, OcrAuditInfo, OcrEngineType, PaddleConfig};
use det::TextDetector;
use rec::{LineRecognizer, LineText};

pub use threading::{thread_settings, INTER_THREADS_ENV, THREADS_ENV};

const CONFIDENCE_FLOOR: f32 = 0.3;
const MAX_BATCH_SIZE: usize = 32;

pub struct PaddleEngine {
    config: PaddleConfig,
    detector: TextDetector,
    recognizer: LineRecognizer,
}

impl PaddleEngine {
    /// All three paths must be configured and exist.
    pub fn new(config: PaddleConfig) -> Result<Self, OcrError> {
        let det_path = required_path(config.det_model_path.as_deref(), "detModelPath")?;
        let rec_path = required_path(config.rec_model_path.as_deref(), "recModelPath")?;
        let dict_path = required_path(config.dict_path.as_deref(), "dictPath")?;

        log::info!("[Paddle] loading detection model {}", det_path.display());
        let detector = TextDetector::new(det_path)?;
        log::info!("[Paddle] loading recognition model {}", rec_path.display());
        let recognizer = LineRecognizer::new(rec_path, dict_path)?;

        log::info!("[Paddle] engine ready");
        Ok(Self {
            config,
            detector,
            recognizer,
        })
    }

    pub fn config(&self) -> &PaddleConfig {
        &self.config
    }

    fn recognize_lines(&mut self, crops: &[DynamicImage]) -> Vec<LineText> {
        let mut lines = Vec::with_capacity(crops.len());
        for batch in tensor::prepare_rec_batch(crops, MAX_BATCH_SIZE) {
            let batch_len = batch.shape()[0];
            match self.recognizer.recognize_batch(batch) {
                Ok(batch_lines) => lines.extend(batch_lines),
                Err(e) => {
                    // keep indices aligned with the boxes
                    log::warn!("[Paddle] batch recognition failed: {}", e);
                    lines.extend((0..batch_len).map(|_| LineText {
                        text: String::new(),
                        confidence: 0.0,
                    }));
                }
            }
        }
        lines
    }
}

fn required_path<'a>(value: Option<&'a str>, key: &str) -> Result<&'a Path, OcrError> {
    let path = value
        .map(Path::new)
        .ok_or_else(|| OcrError::Unavailable(format!("paddle.{key} is not configured")))?;
    if !path.exists() {
        return Err(OcrError::Unavailable(format!(
            "paddle.{key} {} does not exist",
            path.display()
        )));
    }
    Ok(path)
}

impl OcrBackend for PaddleEngine {
    fn engine_type(&self) -> OcrEngineType {
        OcrEngineType::Paddle
    }

    fn confidence_floor(&self) -> f32 {
        CONFIDENCE_FLOOR
    }

    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<Fragment>, OcrError> {
        let (orig_w, orig_h) = (img.width(), img.height());
        if orig_w == 0 || orig_h == 0 {
            return Err(OcrError::ImageProcess("empty image".to_string()));
        }

        let det_start = Instant::now();
        let boxes = self
            .detector
            .detect(tensor::prepare_det_input(img), orig_w, orig_h)?;
        log::info!(
            "[Paddle] {} text regions in {} ms",
            boxes.len(),
            det_start.elapsed().as_millis()
        );
        if boxes.is_empty() {
            return Ok(Vec::new());
        }

        let rec_start = Instant::now();
        let crops: Vec<DynamicImage> = boxes
            .iter()
            .map(|b| tensor::crop_text_region(img, &b.points))
            .collect();
        let lines = self.recognize_lines(&crops);

        let fragments: Vec<Fragment> = boxes
            .iter()
            .zip(lines)
            .filter(|(_, line)| !line.text.trim().is_empty())
            .map(|(text_box, line)| Fragment {
                text: line.text,
                confidence: line.confidence,
                bbox: relative_bbox(&text_box.points, orig_w, orig_h),
            })
            .collect();

        log::info!(
            "[Paddle] {} lines recognized in {} ms",
            fragments.len(),
            rec_start.elapsed().as_millis()
        );
        Ok(fragments)
    }

    fn audit_info(&self) -> OcrAuditInfo {
        let (intra, inter) = thread_settings();
        OcrAuditInfo {
            engine_type: OcrEngineType::Paddle,
            engine_version: Some("PP-OCR (onnx)".to_string()),
            engine_params: Some(serde_json::json!({
                "detModelPath": self.config.det_model_path,
                "recModelPath": self.config.rec_model_path,
                "dictPath": self.config.dict_path,
                "intraThreads": intra,
                "interThreads": inter,
            })),
            tessdata_hash: None,
        }
    }
}

fn relative_bbox(points: &[[f32; 2]; 4], img_w: u32, img_h: u32) -> BBox {
    let (x0, y0, x1, y1) = tensor::hull(points);
    BBox {
        x: x0 / img_w as f32,
        y: y0 / img_h as f32,
        w: (x1 - x0) / img_w as f32,
        h: (y1 - y0) / img_h as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_bbox() {
        let points = [[10.0, 20.0], [100.0, 20.0], [100.0, 50.0], [10.0, 50.0]];
        let bbox = relative_bbox(&points, 200, 100);
        assert!((bbox.x - 0.05).abs() < 0.001);
        assert!((bbox.y - 0.2).abs() < 0.001);
        assert!((bbox.w - 0.45).abs() < 0.001);
        assert!((bbox.h - 0.3).abs() < 0.001);
    }

    #[test]
    fn test_unconfigured_paths_are_unavailable() {
        let result = PaddleEngine::new(PaddleConfig::default());
        assert!(matches!(result, Err(OcrError::Unavailable(_))));

        let config = PaddleConfig {
            det_model_path: Some("/nonexistent/det.onnx".to_string()),
            rec_model_path: Some("/nonexistent/rec.onnx".to_string()),
            dict_path: Some("/nonexistent/dict.txt".to_string()),
        };
        assert!(matches!(PaddleEngine::new(config), Err(OcrError::Unavailable(_))));
    }
}
