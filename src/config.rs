use docshield_core::PipelineOptions;
use docshield_ocr::{
    OcrEngineType, PaddleConfig, PreprocessOptions, RecognizerOptions, TesseractConfig,
};
use docshield_render::RedactionMethod;
use docshield_rules::PatternSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENGINE_ENV: &str = "DOCSHIELD_OCR_ENGINE";
pub const FALLBACK_CONFIDENCE_ENV: &str = "DOCSHIELD_FALLBACK_CONFIDENCE";
pub const SKEW_THRESHOLD_ENV: &str = "DOCSHIELD_SKEW_THRESHOLD";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    // ============ OCR ============
    /// Preferred OCR engine
    pub ocr_engine: Option<OcrEngineType>,
    pub tesseract: Option<TesseractConfig>,
    pub paddle: Option<PaddleConfig>,
    /// Primary results under this confidence trigger the fallback engine
    pub fallback_confidence: Option<f32>,

    // ============ Preprocessing ============
    /// Degrees
    pub skew_threshold: Option<f64>,

    // ============ Pipeline ============
    pub stage_budget_ms: Option<u64>,
    pub redaction_method: Option<RedactionMethod>,
    /// Added to the built-in PII pattern battery
    pub extra_pii_patterns: Vec<PatternSource>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `$XDG_CONFIG_HOME/docshield/config.json` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("docshield").join("config.json"))
}

/// Reads `explicit` when given (it must exist), else the default location
/// when present, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(AppConfig::default()),
        },
    };
    log::debug!("[Config] loading {}", path.display());
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

impl AppConfig {
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENGINE_ENV) {
            self.ocr_engine = Some(parse_env(ENGINE_ENV, &value)?);
        }
        if let Some(value) = lookup(FALLBACK_CONFIDENCE_ENV) {
            let confidence: f32 = parse_env(FALLBACK_CONFIDENCE_ENV, &value)?;
            if !(0.0..=1.0).contains(&confidence) {
                return Err(ConfigError::InvalidEnv {
                    key: FALLBACK_CONFIDENCE_ENV,
                    value,
                });
            }
            self.fallback_confidence = Some(confidence);
        }
        if let Some(value) = lookup(SKEW_THRESHOLD_ENV) {
            self.skew_threshold = Some(parse_env(SKEW_THRESHOLD_ENV, &value)?);
        }
        Ok(())
    }

    pub fn engine(&self) -> OcrEngineType {
        self.ocr_engine.unwrap_or_default()
    }

    pub fn tesseract_config(&self) -> TesseractConfig {
        self.tesseract.clone().unwrap_or_default()
    }

    pub fn paddle_config(&self) -> PaddleConfig {
        self.paddle.clone().unwrap_or_default()
    }

    pub fn recognizer_options(&self) -> RecognizerOptions {
        let defaults = RecognizerOptions::default();
        RecognizerOptions {
            preferred: self.engine(),
            fallback_confidence: self.fallback_confidence.unwrap_or(defaults.fallback_confidence),
        }
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        let defaults = PreprocessOptions::default();
        PreprocessOptions {
            skew_threshold: self.skew_threshold.unwrap_or(defaults.skew_threshold),
            ..defaults
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            stage_budget: self.stage_budget_ms.map(Duration::from_millis),
        }
    }

    pub fn redaction_method(&self) -> RedactionMethod {
        self.redaction_method.unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine(), OcrEngineType::Tesseract);
        assert_eq!(config.recognizer_options().fallback_confidence, 0.3);
        assert_eq!(config.preprocess_options().skew_threshold, 0.5);
        assert!(config.pipeline_options().stage_budget.is_none());
        assert_eq!(config.redaction_method(), RedactionMethod::BlackBox);
    }

    #[test]
    fn test_load_camel_case_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "ocrEngine": "paddle",
                "tesseract": { "lang": "eng+deu", "psm": 4 },
                "paddle": { "detModelPath": "/m/det.onnx" },
                "stageBudgetMs": 1500,
                "redactionMethod": "blur",
                "extraPiiPatterns": [
                    { "category": "medical_id", "pattern": "\\bINS-\\d{6}\\b", "labeled": false }
                ]
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine(), OcrEngineType::Paddle);
        assert_eq!(config.tesseract_config().lang_or_default(), "eng+deu");
        assert_eq!(config.tesseract_config().psm_or_default(), 4);
        assert_eq!(config.paddle_config().det_model_path.as_deref(), Some("/m/det.onnx"));
        assert_eq!(config.pipeline_options().stage_budget, Some(Duration::from_millis(1500)));
        assert_eq!(config.redaction_method(), RedactionMethod::Blur);
        assert_eq!(config.extra_pii_patterns.len(), 1);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("nope.json")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_unknown_redaction_method_rejected() {
        let result: Result<AppConfig, _> = serde_json::from_str(r#"{ "redactionMethod": "smudge" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig {
            ocr_engine: Some(OcrEngineType::Tesseract),
            ..Default::default()
        };
        config
            .apply_overrides(lookup(&[
                (ENGINE_ENV, "paddle"),
                (FALLBACK_CONFIDENCE_ENV, "0.45"),
                (SKEW_THRESHOLD_ENV, "1.5"),
            ]))
            .unwrap();
        assert_eq!(config.engine(), OcrEngineType::Paddle);
        assert_eq!(config.recognizer_options().fallback_confidence, 0.45);
        assert_eq!(config.preprocess_options().skew_threshold, 1.5);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(lookup(&[(FALLBACK_CONFIDENCE_ENV, "2.0")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { key, .. }) if key == FALLBACK_CONFIDENCE_ENV));

        let result = config.apply_overrides(lookup(&[(ENGINE_ENV, "easyocr")]));
        assert!(result.is_err());
        assert_eq!(config.engine(), OcrEngineType::Tesseract);
    }
}
