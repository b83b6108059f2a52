//! Engine selection with fallback
//!
//! The preferred backend runs first. When it yields no text or a confidence
//! under the fallback threshold, the other backend runs too (if it came up at
//! construction) and the more confident of the two attempts wins. Backend
//! errors and panics become failed attempts; recognition itself never fails.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::backend::{BackendOutput, OcrBackend};
use crate::error::OcrError;
use crate::postprocess::postprocess;
use crate::tesseract::TesseractEngine;
use crate::types::{OcrAuditInfo, OcrEngineType, PaddleConfig, TesseractConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerOptions {
    pub preferred: OcrEngineType,
    /// Primary results below this confidence trigger the fallback
    pub fallback_confidence: f32,
}

impl Default for RecognizerOptions {
    fn default() -> Self {
        Self {
            preferred: OcrEngineType::default(),
            fallback_confidence: 0.3,
        }
    }
}

/// One backend run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub engine: OcrEngineType,
    pub succeeded: bool,
    pub confidence: f32,
    pub fragments_kept: usize,
    pub fragments_total: usize,
    pub text_length: usize,
    pub error: Option<String>,
    #[serde(skip)]
    text: String,
}

impl Attempt {
    fn recognized(engine: OcrEngineType, output: BackendOutput) -> Self {
        Self {
            engine,
            succeeded: true,
            confidence: output.confidence.clamp(0.0, 1.0),
            fragments_kept: output.fragments_kept,
            fragments_total: output.fragments_total,
            text_length: output.text.chars().count(),
            error: None,
            text: output.text,
        }
    }

    fn failed(engine: OcrEngineType, reason: String) -> Self {
        Self {
            engine,
            succeeded: false,
            confidence: 0.0,
            fragments_kept: 0,
            fragments_total: 0,
            text_length: 0,
            error: Some(reason),
            text: String::new(),
        }
    }

    fn is_weak(&self, threshold: f32) -> bool {
        self.text.trim().is_empty() || self.confidence < threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionMetadata {
    pub primary_engine: OcrEngineType,
    pub engines_tried: Vec<OcrEngineType>,
    pub fallback_used: bool,
    pub selected_engine: OcrEngineType,
    pub attempts: Vec<Attempt>,
    /// Selected text before post-processing, in chars
    pub original_length: usize,
    pub cleaned_length: usize,
}

#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
    pub metadata: RecognitionMetadata,
}

pub struct TextRecognizer {
    backends: BTreeMap<OcrEngineType, Box<dyn OcrBackend>>,
    unavailable: BTreeMap<OcrEngineType, String>,
    options: RecognizerOptions,
}

impl TextRecognizer {
    pub fn new(backends: Vec<Box<dyn OcrBackend>>, options: RecognizerOptions) -> Self {
        let backends = backends.into_iter().map(|b| (b.engine_type(), b)).collect();
        Self {
            backends,
            unavailable: BTreeMap::new(),
            options,
        }
    }

    /// Brings up every backend once. One that fails stays absent for the
    /// lifetime of the recognizer.
    pub fn initialize(
        tesseract: &TesseractConfig,
        paddle: &PaddleConfig,
        options: RecognizerOptions,
    ) -> Self {
        let mut recognizer = Self::new(Vec::new(), options);

        match TesseractEngine::new(tesseract.clone()) {
            Ok(engine) => recognizer.add_backend(Box::new(engine)),
            Err(e) => recognizer.mark_unavailable(OcrEngineType::Tesseract, e),
        }
        match init_paddle(paddle) {
            Ok(engine) => recognizer.add_backend(engine),
            Err(e) => recognizer.mark_unavailable(OcrEngineType::Paddle, e),
        }

        if recognizer.backends.is_empty() {
            log::warn!("[OCR] no OCR backend available, recognition will return empty text");
        }
        recognizer
    }

    fn add_backend(&mut self, backend: Box<dyn OcrBackend>) {
        log::info!("[OCR] backend {} available", backend.engine_type());
        self.backends.insert(backend.engine_type(), backend);
    }

    fn mark_unavailable(&mut self, engine: OcrEngineType, error: OcrError) {
        log::warn!("[OCR] backend {} unavailable: {}", engine, error);
        self.unavailable.insert(engine, error.to_string());
    }

    pub fn options(&self) -> &RecognizerOptions {
        &self.options
    }

    pub fn is_available(&self, engine: OcrEngineType) -> bool {
        self.backends.contains_key(&engine)
    }

    pub fn available_engines(&self) -> Vec<OcrEngineType> {
        self.backends.keys().copied().collect()
    }

    /// Why each missing backend failed to come up
    pub fn unavailable_engines(&self) -> &BTreeMap<OcrEngineType, String> {
        &self.unavailable
    }

    pub fn audit_info(&self) -> Vec<OcrAuditInfo> {
        self.backends.values().map(|b| b.audit_info()).collect()
    }

    /// Recognizes with the configured preferred engine.
    pub fn extract(&mut self, img: &DynamicImage) -> Recognition {
        self.extract_with(img, self.options.preferred)
    }

    pub fn extract_with(&mut self, img: &DynamicImage, preferred: OcrEngineType) -> Recognition {
        let start = Instant::now();
        let threshold = self.options.fallback_confidence;

        let primary = self.attempt(preferred, img);
        let mut engines_tried = vec![preferred];
        let mut fallback_used = false;
        let mut attempts = vec![primary];

        let secondary = preferred.other();
        if attempts[0].is_weak(threshold) && self.is_available(secondary) {
            log::info!(
                "[OCR] {} confidence {:.2} below {:.2}, trying {}",
                preferred,
                attempts[0].confidence,
                threshold,
                secondary
            );
            engines_tried.push(secondary);
            attempts.push(self.attempt(secondary, img));
            fallback_used = true;
        }

        // ties keep the primary
        let selected = match attempts.get(1) {
            Some(second) if second.confidence > attempts[0].confidence => 1,
            _ => 0,
        };
        let raw = &attempts[selected];
        let selected_engine = raw.engine;
        let original_length = raw.text.chars().count();
        let confidence = raw.confidence;
        let text = postprocess(&raw.text);

        log::info!(
            "[OCR] selected {} ({} chars, confidence {:.2}) in {} ms",
            selected_engine,
            text.chars().count(),
            confidence,
            start.elapsed().as_millis()
        );
        log::debug!("[OCR] preview: {:?}", text.chars().take(40).collect::<String>());

        let metadata = RecognitionMetadata {
            primary_engine: preferred,
            engines_tried,
            fallback_used,
            selected_engine,
            attempts,
            original_length,
            cleaned_length: text.chars().count(),
        };
        Recognition {
            text,
            confidence,
            metadata,
        }
    }

    fn attempt(&mut self, engine: OcrEngineType, img: &DynamicImage) -> Attempt {
        let Some(backend) = self.backends.get_mut(&engine) else {
            let reason = self
                .unavailable
                .get(&engine)
                .cloned()
                .unwrap_or_else(|| "backend not initialized".to_string());
            return Attempt::failed(engine, reason);
        };

        match catch_unwind(AssertUnwindSafe(|| backend.extract(img))) {
            Ok(Ok(output)) => Attempt::recognized(engine, output),
            Ok(Err(e)) => {
                log::warn!("[OCR] {} failed: {}", engine, e);
                Attempt::failed(engine, e.to_string())
            }
            Err(_) => {
                log::error!("[OCR] {} panicked during recognition", engine);
                Attempt::failed(engine, "backend panicked".to_string())
            }
        }
    }
}

#[cfg(feature = "paddle")]
fn init_paddle(config: &PaddleConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    Ok(Box::new(crate::paddle::PaddleEngine::new(config.clone())?))
}

#[cfg(not(feature = "paddle"))]
fn init_paddle(_config: &PaddleConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    Err(OcrError::Unavailable("built without the `paddle` feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BBox, Fragment};

    enum Script {
        Fragments(Vec<(&'static str, f32)>),
        Fail,
        Panic,
    }

    struct MockBackend {
        engine: OcrEngineType,
        floor: f32,
        script: Script,
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl MockBackend {
        fn boxed(engine: OcrEngineType, script: Script) -> Box<dyn OcrBackend> {
            Box::new(Self {
                engine,
                floor: 0.3,
                script,
                calls: Default::default(),
            })
        }
    }

    impl OcrBackend for MockBackend {
        fn engine_type(&self) -> OcrEngineType {
            self.engine
        }

        fn confidence_floor(&self) -> f32 {
            self.floor
        }

        fn recognize_image(&mut self, _img: &DynamicImage) -> Result<Vec<Fragment>, OcrError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match &self.script {
                Script::Fragments(items) => Ok(items
                    .iter()
                    .map(|(text, confidence)| Fragment {
                        text: text.to_string(),
                        confidence: *confidence,
                        bbox: BBox::default(),
                    })
                    .collect()),
                Script::Fail => Err(OcrError::Inference("mock failure".to_string())),
                Script::Panic => panic!("mock panic"),
            }
        }

        fn audit_info(&self) -> OcrAuditInfo {
            OcrAuditInfo {
                engine_type: self.engine,
                engine_version: Some("mock".to_string()),
                engine_params: None,
                tessdata_hash: None,
            }
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::new_luma8(8, 8)
    }

    fn recognizer(backends: Vec<Box<dyn OcrBackend>>) -> TextRecognizer {
        TextRecognizer::new(backends, RecognizerOptions::default())
    }

    #[test]
    fn test_confident_primary_skips_fallback() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let secondary: Box<dyn OcrBackend> = Box::new(MockBackend {
            engine: OcrEngineType::Paddle,
            floor: 0.3,
            script: Script::Fragments(vec![("other", 0.99)]),
            calls: calls.clone(),
        });
        let mut r = recognizer(vec![
            MockBackend::boxed(OcrEngineType::Tesseract, Script::Fragments(vec![("Patient", 0.9), ("John", 0.8)])),
            secondary,
        ]);

        let out = r.extract(&image());
        assert_eq!(out.text, "Patient John");
        assert!((out.confidence - 0.85).abs() < 1e-6);
        assert!(!out.metadata.fallback_used);
        assert_eq!(out.metadata.engines_tried, vec![OcrEngineType::Tesseract]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_low_confidence_primary_falls_back() {
        // 0.1 fragments sit under the floor, so the primary reports nothing
        let mut r = recognizer(vec![
            MockBackend::boxed(OcrEngineType::Tesseract, Script::Fragments(vec![("blurry", 0.1)])),
            MockBackend::boxed(OcrEngineType::Paddle, Script::Fragments(vec![("Clear text", 0.8)])),
        ]);

        let out = r.extract(&image());
        assert!(out.metadata.fallback_used);
        assert_eq!(out.metadata.selected_engine, OcrEngineType::Paddle);
        assert_eq!(
            out.metadata.engines_tried,
            vec![OcrEngineType::Tesseract, OcrEngineType::Paddle]
        );
        assert_eq!(out.text, "Clear text");
        assert!((out.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_primary_confidence_point_one_falls_back() {
        let primary: Box<dyn OcrBackend> = Box::new(MockBackend {
            engine: OcrEngineType::Tesseract,
            floor: 0.0,
            script: Script::Fragments(vec![("weak", 0.1)]),
            calls: Default::default(),
        });
        let mut r = recognizer(vec![
            primary,
            MockBackend::boxed(OcrEngineType::Paddle, Script::Fragments(vec![("strong", 0.9)])),
        ]);
        let out = r.extract(&image());
        assert!((out.metadata.attempts[0].confidence - 0.1).abs() < 1e-6);
        assert!(out.metadata.attempts[0].succeeded);
        assert!(out.metadata.fallback_used);
        assert_eq!(out.metadata.selected_engine, OcrEngineType::Paddle);
        assert_eq!(out.text, "strong");
    }

    #[test]
    fn test_fallback_tie_keeps_primary() {
        let mut r = TextRecognizer::new(
            vec![
                MockBackend::boxed(OcrEngineType::Tesseract, Script::Fragments(vec![("first", 0.5)])),
                MockBackend::boxed(OcrEngineType::Paddle, Script::Fragments(vec![("second", 0.5)])),
            ],
            RecognizerOptions {
                preferred: OcrEngineType::Tesseract,
                fallback_confidence: 0.6,
            },
        );
        let out = r.extract(&image());
        assert!(out.metadata.fallback_used);
        assert_eq!(out.metadata.selected_engine, OcrEngineType::Tesseract);
        assert_eq!(out.text, "first");
    }

    #[test]
    fn test_failed_backend_becomes_empty_attempt() {
        let mut r = recognizer(vec![
            MockBackend::boxed(OcrEngineType::Tesseract, Script::Fail),
            MockBackend::boxed(OcrEngineType::Paddle, Script::Panic),
        ]);
        let out = r.extract(&image());
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
        assert!(out.metadata.fallback_used);
        assert!(out.metadata.attempts.iter().all(|a| !a.succeeded && a.error.is_some()));
    }

    #[test]
    fn test_missing_primary_uses_secondary() {
        let mut r = recognizer(vec![MockBackend::boxed(
            OcrEngineType::Paddle,
            Script::Fragments(vec![("Only paddle", 0.7)]),
        )]);
        let out = r.extract(&image());
        assert_eq!(out.metadata.primary_engine, OcrEngineType::Tesseract);
        assert_eq!(out.metadata.selected_engine, OcrEngineType::Paddle);
        assert!(!out.metadata.attempts[0].succeeded);
        assert_eq!(out.text, "Only paddle");
    }

    #[test]
    fn test_no_fallback_when_secondary_absent() {
        let mut r = recognizer(vec![MockBackend::boxed(
            OcrEngineType::Tesseract,
            Script::Fragments(vec![("faint", 0.2)]),
        )]);
        let out = r.extract(&image());
        assert!(!out.metadata.fallback_used);
        assert_eq!(out.metadata.engines_tried.len(), 1);
        assert!(out.text.is_empty());
    }

    #[test]
    fn test_selected_text_is_postprocessed() {
        let mut r = recognizer(vec![MockBackend::boxed(
            OcrEngineType::Tesseract,
            Script::Fragments(vec![("J0hn", 0.9), ("  D0E ", 0.9)]),
        )]);
        let out = r.extract(&image());
        assert_eq!(out.text, "John DOE");
        assert_eq!(out.metadata.original_length, "J0hn D0E".len());
    }

    #[test]
    fn test_initialize_records_unavailable_backends() {
        let tesseract = TesseractConfig {
            binary_path: Some("/nonexistent/docshield-tesseract".to_string()),
            ..Default::default()
        };
        let mut r = TextRecognizer::initialize(&tesseract, &PaddleConfig::default(), RecognizerOptions::default());
        assert!(r.available_engines().is_empty());
        assert!(r.unavailable_engines().contains_key(&OcrEngineType::Tesseract));
        assert!(r.unavailable_engines().contains_key(&OcrEngineType::Paddle));

        let out = r.extract(&image());
        assert!(out.text.is_empty());
        assert!(!out.metadata.fallback_used);
    }
}
