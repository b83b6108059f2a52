//! End-to-end processing
//!
//! Stages run strictly in order: input, preprocessing, ocr, text_cleaning,
//! pii_detection and the optional redaction. A mandatory stage that fails
//! ends the run with an [`ErrorRecord`]; a failed redaction is recorded and
//! the result is still returned.

use docshield_ocr::{Preprocessor, TextRecognizer};
use docshield_render::{redact_image, CharSpan, RedactionMethod};
use docshield_rules::{PiiCategory, PiiDetector, PiiMatch};
use docshield_text::TextCleaner;
use image::{DynamicImage, ImageFormat};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{CoreError, Result};
use crate::types::{ErrorRecord, PipelineResult, ProcessingMetadata, Stage, StageMetadata};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// A stage running longer than this logs a warning; it is not aborted
    pub stage_budget: Option<Duration>,
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub redact: bool,
    pub method: RedactionMethod,
    /// Where the redacted image goes. Redaction is skipped without one.
    pub output_dir: Option<PathBuf>,
}

pub struct Pipeline {
    preprocessor: Preprocessor,
    recognizer: TextRecognizer,
    cleaner: TextCleaner,
    detector: PiiDetector,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        preprocessor: Preprocessor,
        recognizer: TextRecognizer,
        cleaner: TextCleaner,
        detector: PiiDetector,
        options: PipelineOptions,
    ) -> Self {
        log::info!(
            "[Pipeline] ready, engines: {:?}, {} PII patterns",
            recognizer.available_engines(),
            detector.table().pattern_count()
        );
        Self {
            preprocessor,
            recognizer,
            cleaner,
            detector,
            options,
        }
    }

    /// Pipeline over the built-in cleaner tables and pattern battery
    pub fn with_builtin(
        preprocessor: Preprocessor,
        recognizer: TextRecognizer,
        options: PipelineOptions,
    ) -> Result<Self> {
        let cleaner = TextCleaner::with_builtin()?;
        let detector = PiiDetector::with_builtin()?;
        Ok(Self::new(preprocessor, recognizer, cleaner, detector, options))
    }

    pub fn recognizer(&self) -> &TextRecognizer {
        &self.recognizer
    }

    pub fn detector(&self) -> &PiiDetector {
        &self.detector
    }

    pub fn process_image(
        &mut self,
        path: &Path,
        options: &ProcessOptions,
    ) -> std::result::Result<PipelineResult, ErrorRecord> {
        let mut run = Run::start(path, self.options.stage_budget);
        log::info!("[Pipeline] processing {}", path.display());

        let clock = Instant::now();
        let image = match load_jpeg(path) {
            Ok(image) => image,
            Err(e) => return Err(run.fail(Stage::Input, clock, e.to_string())),
        };
        run.complete(
            Stage::Input,
            clock,
            details(json!({
                "format": "jpeg",
                "width": image.width(),
                "height": image.height(),
            })),
        );

        let clock = Instant::now();
        let preprocessor = &self.preprocessor;
        let (processed, prep) = match guard(|| preprocessor.preprocess(&image)) {
            Ok(output) => output,
            Err(msg) => return Err(run.fail(Stage::Preprocessing, clock, msg)),
        };
        drop(image);
        run.complete(
            Stage::Preprocessing,
            clock,
            details(json!({
                "operations_applied": prep.preprocessing_steps,
                "skew_angle": prep.skew_angle,
                "skew_corrected": prep.skew_corrected,
                "original_dimensions": prep.original_dimensions,
                "final_dimensions": prep.final_dimensions,
            })),
        );

        let clock = Instant::now();
        let recognizer = &mut self.recognizer;
        let recognition = match guard(|| recognizer.extract(&processed)) {
            Ok(recognition) => recognition,
            Err(msg) => return Err(run.fail(Stage::Ocr, clock, msg)),
        };
        log::info!(
            "[Pipeline] OCR selected {}, confidence {:.2}, {} chars",
            recognition.metadata.selected_engine,
            recognition.confidence,
            recognition.text.chars().count()
        );
        let ocr = &recognition.metadata;
        run.complete(
            Stage::Ocr,
            clock,
            details(json!({
                "engine_used": ocr.selected_engine,
                "engines_tried": ocr.engines_tried,
                "fallback_used": ocr.fallback_used,
                "confidence_score": recognition.confidence,
                "text_length": recognition.text.chars().count(),
                "original_length": ocr.original_length,
                "cleaned_length": ocr.cleaned_length,
                "attempts": ocr.attempts,
            })),
        );

        let clock = Instant::now();
        let cleaner = &self.cleaner;
        let raw = recognition.text;
        let (cleaned, cleaning) = match guard(|| cleaner.clean(&raw)) {
            Ok(output) => output,
            Err(msg) => return Err(run.fail(Stage::TextCleaning, clock, msg)),
        };
        log::info!(
            "[Pipeline] text cleaned, quality {:.2}",
            cleaning.quality.quality_score
        );
        run.complete(
            Stage::TextCleaning,
            clock,
            details(json!({
                "quality_metrics": cleaning.quality,
                "quality_score": cleaning.quality.quality_score,
                "original_length": cleaning.original_length,
                "cleaned_length": cleaning.cleaned_length,
                "cleaning_steps": cleaning.cleaning_steps,
                "structured_info": cleaning.structured_info,
            })),
        );

        let clock = Instant::now();
        let detector = &self.detector;
        let matches = match guard(|| detector.detect(&cleaned)) {
            Ok(matches) => matches,
            Err(msg) => return Err(run.fail(Stage::PiiDetection, clock, msg)),
        };
        let types: BTreeSet<PiiCategory> = matches.iter().map(|m| m.category()).collect();
        log::info!("[Pipeline] {} PII matches", matches.len());
        run.complete(
            Stage::PiiDetection,
            clock,
            details(json!({
                "matches_found": matches.len(),
                "types_detected": types,
            })),
        );

        let redacted_image_path = match &options.output_dir {
            Some(dir) if options.redact && !matches.is_empty() => {
                redact(&mut run, path, dir, &matches, options.method)
            }
            _ => None,
        };

        let metadata = run.finish();
        log::info!(
            "[Pipeline] finished {} in {:.2}s",
            path.display(),
            metadata.total_duration_seconds
        );
        Ok(PipelineResult {
            cleaned_text: cleaned,
            pii_matches: matches,
            metadata,
            redacted_image_path,
        })
    }

    /// Processes each path in turn. One image failing never stops the rest.
    pub fn process_batch(&mut self, paths: &[PathBuf], options: &ProcessOptions) -> BatchReport {
        log::info!("[Pipeline] batch of {} images", paths.len());
        let mut report = BatchReport::default();

        for (i, path) in paths.iter().enumerate() {
            log::info!("[Pipeline] image {}/{}: {}", i + 1, paths.len(), path.display());
            let outcome = match guard(|| self.process_image(path, options)) {
                Ok(outcome) => outcome,
                Err(msg) => Err(Run::start(path, None).fail(Stage::Pipeline, Instant::now(), msg)),
            };
            report.items.push(BatchItem {
                path: path.clone(),
                outcome,
            });
        }

        log::info!(
            "[Pipeline] batch done: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}

#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub outcome: std::result::Result<PipelineResult, ErrorRecord>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn total_matches(&self) -> usize {
        self.items
            .iter()
            .filter_map(|item| item.outcome.as_ref().ok())
            .map(|result| result.pii_matches.len())
            .sum()
    }
}

/// Checks the extension and the sniffed content, then decodes.
pub fn load_jpeg(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(CoreError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => {}
        Some(other) => return Err(CoreError::NotJpeg(format!(".{}", other))),
        None => return Err(CoreError::NotJpeg("no extension".to_string())),
    }

    let bytes = std::fs::read(path)?;
    match image::guess_format(&bytes) {
        Ok(ImageFormat::Jpeg) => {}
        Ok(other) => {
            let name = format!("{:?}", other).to_lowercase();
            return Err(CoreError::NotJpeg(format!("{} content", name)));
        }
        Err(_) => return Err(CoreError::NotJpeg("unrecognized content".to_string())),
    }

    Ok(image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)?)
}

fn redact(
    run: &mut Run,
    path: &Path,
    output_dir: &Path,
    matches: &[PiiMatch],
    method: RedactionMethod,
) -> Option<PathBuf> {
    let clock = Instant::now();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let output = output_dir.join(format!("redacted_{}.jpg", stem));
    let spans: Vec<CharSpan> = matches
        .iter()
        .map(|m| CharSpan {
            start: m.start(),
            end: m.end(),
        })
        .collect();

    match redact_image(path, &spans, &output, method) {
        Ok(written) => {
            run.complete(
                Stage::Redaction,
                clock,
                details(json!({
                    "method": method,
                    "output_path": written,
                    "pii_redacted": matches.len(),
                })),
            );
            Some(written)
        }
        Err(e) => {
            log::warn!("[Pipeline] redaction failed: {}", e);
            run.record_failure(Stage::Redaction, clock, e.to_string());
            None
        }
    }
}

/// Metadata being collected for one image
struct Run {
    started: Instant,
    budget: Option<Duration>,
    metadata: ProcessingMetadata,
}

impl Run {
    fn start(path: &Path, budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
            metadata: ProcessingMetadata::new(path.display().to_string()),
        }
    }

    fn complete(&mut self, stage: Stage, clock: Instant, details: Map<String, Value>) {
        let elapsed = self.elapsed(stage, clock);
        self.metadata.stages.insert(
            stage,
            StageMetadata {
                duration_seconds: elapsed.as_secs_f64(),
                success: true,
                error: None,
                details,
            },
        );
        self.metadata.processing_stages.push(stage);
    }

    fn record_failure(&mut self, stage: Stage, clock: Instant, message: String) {
        let elapsed = self.elapsed(stage, clock);
        self.metadata.stages.insert(
            stage,
            StageMetadata {
                duration_seconds: elapsed.as_secs_f64(),
                success: false,
                error: Some(message),
                details: Map::new(),
            },
        );
    }

    fn fail(mut self, stage: Stage, clock: Instant, message: String) -> ErrorRecord {
        log::error!("[Pipeline] {} failed: {}", stage, message);
        self.record_failure(stage, clock, message.clone());
        self.metadata.total_duration_seconds = self.started.elapsed().as_secs_f64();
        self.metadata.success = false;
        ErrorRecord {
            error_kind: stage.error_kind(),
            message,
            failing_stage: stage,
            diagnostic_info: self.metadata,
        }
    }

    fn finish(mut self) -> ProcessingMetadata {
        self.metadata.total_duration_seconds = self.started.elapsed().as_secs_f64();
        self.metadata.success = true;
        self.metadata
    }

    fn elapsed(&self, stage: Stage, clock: Instant) -> Duration {
        let elapsed = clock.elapsed();
        if let Some(budget) = self.budget {
            if elapsed > budget {
                log::warn!(
                    "[Pipeline] {} took {:.2}s, over the {:.2}s budget",
                    stage,
                    elapsed.as_secs_f64(),
                    budget.as_secs_f64()
                );
            }
        }
        elapsed
    }
}

fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn guard<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
