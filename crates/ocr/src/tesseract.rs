//! Tesseract backend (CLI wrapper)

use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use crate::backend::OcrBackend;
use crate::error::OcrError;
use crate::types::{BBox, Fragment, OcrAuditInfo, OcrEngineType, TesseractConfig};

/// Tesseract reports 0-100; fragments must score above 30.
const CONFIDENCE_FLOOR: f32 = 0.30;

/// TSV row level of a single word
const WORD_LEVEL: i32 = 5;

pub struct TesseractEngine {
    config: TesseractConfig,
    version: String,
}

impl TesseractEngine {
    /// Fails when the binary cannot be executed.
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let version = get_tesseract_version(config.binary_or_default())?;
        log::info!("[Tesseract] initialized, version {}", version);
        Ok(Self { config, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    fn run(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut cmd = Command::new(self.config.binary_or_default());
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(self.config.lang_or_default())
            .arg("--psm")
            .arg(self.config.psm_or_default().to_string())
            .arg("--oem")
            .arg(self.config.oem_or_default().to_string())
            .arg("tsv");

        if let Some(tessdata_path) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata_path);
        }

        log::debug!(
            "[Tesseract] running {} {} -l {} --psm {} --oem {} tsv",
            self.config.binary_or_default(),
            image_path.display(),
            self.config.lang_or_default(),
            self.config.psm_or_default(),
            self.config.oem_or_default()
        );

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Inference(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrBackend for TesseractEngine {
    fn engine_type(&self) -> OcrEngineType {
        OcrEngineType::Tesseract
    }

    fn confidence_floor(&self) -> f32 {
        CONFIDENCE_FLOOR
    }

    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<Fragment>, OcrError> {
        let start = Instant::now();
        if img.width() == 0 || img.height() == 0 {
            return Err(OcrError::ImageProcess("empty image".to_string()));
        }

        // Removed when dropped
        let scratch = tempfile::Builder::new()
            .prefix("docshield-tesseract-")
            .suffix(".png")
            .tempfile()?;
        img.save_with_format(scratch.path(), ImageFormat::Png)
            .map_err(|e| OcrError::ImageProcess(format!("failed to write scratch image: {}", e)))?;

        let tsv = self.run(scratch.path())?;
        let fragments = parse_tesseract_tsv(&tsv, img.width() as f32, img.height() as f32);

        log::info!(
            "[Tesseract] {} words in {} ms",
            fragments.len(),
            start.elapsed().as_millis()
        );
        Ok(fragments)
    }

    fn audit_info(&self) -> OcrAuditInfo {
        OcrAuditInfo {
            engine_type: OcrEngineType::Tesseract,
            engine_version: Some(self.version.clone()),
            engine_params: Some(serde_json::json!({
                "lang": self.config.lang_or_default(),
                "psm": self.config.psm_or_default(),
                "oem": self.config.oem_or_default(),
            })),
            tessdata_hash: self
                .config
                .tessdata_path
                .as_deref()
                .and_then(|p| compute_tessdata_hash(Path::new(p)).ok()),
        }
    }
}

/// Parses word rows of Tesseract TSV output.
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Rows with negative confidence carry no text.
fn parse_tesseract_tsv(tsv: &str, img_width: f32, img_height: f32) -> Vec<Fragment> {
    let mut fragments = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if level != WORD_LEVEL || text.is_empty() || conf < 0.0 {
            continue;
        }

        let left: f32 = cols[6].parse().unwrap_or(0.0);
        let top: f32 = cols[7].parse().unwrap_or(0.0);
        let width: f32 = cols[8].parse().unwrap_or(0.0);
        let height: f32 = cols[9].parse().unwrap_or(0.0);

        fragments.push(Fragment {
            text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            bbox: BBox {
                x: left / img_width,
                y: top / img_height,
                w: width / img_width,
                h: height / img_height,
            },
        });
    }

    fragments
}

pub fn get_tesseract_version(binary_path: &str) -> Result<String, OcrError> {
    let output = Command::new(binary_path)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Unavailable(format!("cannot execute {}: {}", binary_path, e)))?;

    if !output.status.success() {
        return Err(OcrError::Unavailable(format!("{} --version failed", binary_path)));
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(parse_version(&combined).unwrap_or_else(|| "unknown".to_string()))
}

/// "tesseract 5.3.0" or "tesseract v5.3.0"
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("tesseract"))
        .find_map(|line| line.split_whitespace().nth(1))
        .map(|v| v.trim_start_matches('v').to_string())
}

/// Languages reported by `tesseract --list-langs`.
pub fn get_tesseract_langs(config: &TesseractConfig) -> Result<Vec<String>, OcrError> {
    let mut cmd = Command::new(config.binary_or_default());
    cmd.arg("--list-langs");
    if let Some(path) = &config.tessdata_path {
        cmd.env("TESSDATA_PREFIX", path);
    }

    let output = cmd.output()?;
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(parse_langs(&combined))
}

fn parse_langs(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.contains("List of available languages"))
        .skip(1)
        .filter(|line| !line.is_empty() && !line.contains(':'))
        .map(str::to_string)
        .collect()
}

/// Fingerprint of the installed language data.
fn compute_tessdata_hash(tessdata_path: &Path) -> Result<String, OcrError> {
    let mut entries: Vec<(String, u64)> = std::fs::read_dir(tessdata_path)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "traineddata"))
        .map(|e| {
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            (e.file_name().to_string_lossy().into_owned(), size)
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, size) in &entries {
        hasher.update(name.as_bytes());
        hasher.update(size.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}
