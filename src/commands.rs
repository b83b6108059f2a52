use anyhow::{Context, Result};
use docshield_core::{
    render_error_json, render_result_json, save_error, save_results, BatchItem, ErrorRecord,
    Pipeline, PipelineResult, ProcessOptions,
};
use docshield_ocr::{get_tesseract_langs, Preprocessor, TextRecognizer};
use docshield_rules::{PatternTable, PiiDetector};
use docshield_text::TextCleaner;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{default_config_path, AppConfig};
use crate::discover::discover_images;

/// Output flags shared by every processing command
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub output_dir: Option<PathBuf>,
    pub json: bool,
}

pub fn recognizer(config: &AppConfig) -> TextRecognizer {
    TextRecognizer::initialize(
        &config.tesseract_config(),
        &config.paddle_config(),
        config.recognizer_options(),
    )
}

pub fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let table = PatternTable::with_extra(&config.extra_pii_patterns)
        .context("failed to compile extra PII patterns")?;
    let cleaner = TextCleaner::with_builtin().context("failed to build cleaner tables")?;
    Ok(Pipeline::new(
        Preprocessor::new(config.preprocess_options()),
        recognizer(config),
        cleaner,
        PiiDetector::new(table),
        config.pipeline_options(),
    ))
}

pub fn run_single(
    pipeline: &mut Pipeline,
    image: &Path,
    process: &ProcessOptions,
    output: &OutputOptions,
) -> Result<bool> {
    if !output.json {
        println!("Processing image: {}", image.display());
    }
    let outcome = pipeline.process_image(image, process);
    let stem = file_stem(image);

    match &outcome {
        Ok(result) => {
            if !output.json {
                print_result_summary(result);
            }
            if let Some(dir) = &output.output_dir {
                let saved = save_results(result, dir, &stem)?;
                if !output.json {
                    println!("   Results saved to: {}", saved.json.display());
                    if let Some(redacted) = &saved.redacted_image {
                        println!("   Redacted image: {}", redacted.display());
                    }
                }
            }
            if output.json {
                println!("{}", render_result_json(result)?);
            }
        }
        Err(record) => {
            if let Some(dir) = &output.output_dir {
                save_error(record, dir, &stem)?;
            }
            if output.json {
                println!("{}", render_error_json(record)?);
            } else {
                print_error_summary(record);
            }
        }
    }
    Ok(outcome.is_ok())
}

pub fn run_batch(
    pipeline: &mut Pipeline,
    paths: &[PathBuf],
    process: &ProcessOptions,
    output: &OutputOptions,
) -> Result<bool> {
    let found = discover_images(paths);
    if found.images.is_empty() {
        println!("No valid JPEG images found to process");
        return Ok(false);
    }
    println!("Processing {} images...", found.images.len());

    let report = pipeline.process_batch(&found.images, process);
    for item in &report.items {
        if let Some(dir) = &output.output_dir {
            save_item(item, dir)?;
        }
        let name = item
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &item.outcome {
            Ok(result) => println!("ok   {}: {} PII matches", name, result.pii_matches.len()),
            Err(record) => println!("FAIL {}: {}", name, record.message),
        }
    }

    println!();
    println!("Batch summary:");
    println!("   Total images: {}", report.items.len());
    println!("   Successful: {}", report.succeeded());
    println!("   Failed: {}", report.failed());
    if !found.skipped.is_empty() {
        println!("   Skipped: {}", found.skipped.len());
    }
    println!("   Total PII matches: {}", report.total_matches());
    if let Some(dir) = &output.output_dir {
        println!("   Results saved to: {}", dir.display());
    }
    Ok(report.succeeded() > 0)
}

fn save_item(item: &BatchItem, dir: &Path) -> Result<()> {
    let stem = file_stem(&item.path);
    match &item.outcome {
        Ok(result) => {
            save_results(result, dir, &stem)?;
        }
        Err(record) => {
            save_error(record, dir, &stem)?;
        }
    }
    Ok(())
}

pub fn run_engines(config: &AppConfig, json: bool) -> Result<bool> {
    let recognizer = recognizer(config);
    let audits = recognizer.audit_info();
    let langs = if recognizer.is_available(docshield_ocr::OcrEngineType::Tesseract) {
        get_tesseract_langs(&config.tesseract_config()).unwrap_or_default()
    } else {
        Vec::new()
    };

    if json {
        let report = json!({
            "preferred": config.engine(),
            "available": audits,
            "unavailable": recognizer.unavailable_engines(),
            "tesseractLanguages": langs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Preferred engine: {}", config.engine());
        for audit in &audits {
            println!(
                "   {:<10} available  {}",
                audit.engine_type.to_string(),
                audit.engine_version.as_deref().unwrap_or("unknown version")
            );
            if let Some(params) = &audit.engine_params {
                println!("              {}", params);
            }
        }
        for (engine, reason) in recognizer.unavailable_engines() {
            println!("   {:<10} unavailable: {}", engine.to_string(), reason);
        }
        if !langs.is_empty() {
            println!("Tesseract languages: {}", langs.join(", "));
        }
    }
    Ok(!audits.is_empty())
}

pub fn show_config(config: &AppConfig, source: Option<&Path>) -> Result<bool> {
    let source = source
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .filter(|p| p.exists());
    match source {
        Some(path) => eprintln!("# loaded from {}", path.display()),
        None => eprintln!("# no config file, using defaults"),
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(true)
}

fn print_result_summary(result: &PipelineResult) {
    println!("Processing completed successfully");
    println!("   Total time: {:.2}s", result.metadata.total_duration_seconds);
    println!("   PII matches found: {}", result.pii_matches.len());
    if !result.pii_matches.is_empty() {
        let types: BTreeSet<&str> = result
            .pii_matches
            .iter()
            .map(|m| m.category().as_str())
            .collect();
        println!(
            "   PII types: {}",
            types.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
}

fn print_error_summary(record: &ErrorRecord) {
    println!(
        "Processing failed at {} ({}): {}",
        record.failing_stage, record.error_kind, record.message
    );
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
