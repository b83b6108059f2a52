//! Shared OCR types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OCR backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineType {
    /// Tesseract CLI
    #[default]
    Tesseract,
    /// PP-OCR over ONNX Runtime
    Paddle,
}

impl OcrEngineType {
    pub const ALL: [OcrEngineType; 2] = [OcrEngineType::Tesseract, OcrEngineType::Paddle];

    /// The fallback partner of this engine
    pub fn other(self) -> Self {
        match self {
            OcrEngineType::Tesseract => OcrEngineType::Paddle,
            OcrEngineType::Paddle => OcrEngineType::Tesseract,
        }
    }
}

impl fmt::Display for OcrEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrEngineType::Tesseract => write!(f, "tesseract"),
            OcrEngineType::Paddle => write!(f, "paddle"),
        }
    }
}

impl FromStr for OcrEngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(OcrEngineType::Tesseract),
            "paddle" => Ok(OcrEngineType::Paddle),
            other => Err(format!("unknown OCR engine `{other}` (expected tesseract or paddle)")),
        }
    }
}

/// Bounding box, relative coordinates 0-1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One recognized word or text block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Normalized to 0-1
    pub confidence: f32,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TesseractConfig {
    pub binary_path: Option<String>,
    pub tessdata_path: Option<String>,
    /// e.g. "eng" or "eng+deu"
    pub lang: Option<String>,
    /// Page segmentation mode (0-13)
    pub psm: Option<u8>,
    /// Engine mode (0-3)
    pub oem: Option<u8>,
}

impl TesseractConfig {
    pub fn binary_or_default(&self) -> &str {
        self.binary_path.as_deref().unwrap_or("tesseract")
    }

    pub fn lang_or_default(&self) -> &str {
        self.lang.as_deref().unwrap_or("eng")
    }

    pub fn psm_or_default(&self) -> u8 {
        self.psm.unwrap_or(6)
    }

    pub fn oem_or_default(&self) -> u8 {
        self.oem.unwrap_or(3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaddleConfig {
    pub det_model_path: Option<String>,
    pub rec_model_path: Option<String>,
    /// Character dictionary, one entry per line
    pub dict_path: Option<String>,
}

/// Backend description for audit output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrAuditInfo {
    pub engine_type: OcrEngineType,
    pub engine_version: Option<String>,
    pub engine_params: Option<serde_json::Value>,
    /// sha256 over tessdata file names and sizes (Tesseract only)
    pub tessdata_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_parse_and_display() {
        assert_eq!("Paddle".parse::<OcrEngineType>().unwrap(), OcrEngineType::Paddle);
        assert_eq!(" tesseract ".parse::<OcrEngineType>().unwrap(), OcrEngineType::Tesseract);
        assert!("easyocr".parse::<OcrEngineType>().is_err());
        assert_eq!(OcrEngineType::Paddle.to_string(), "paddle");
        assert_eq!(OcrEngineType::Tesseract.other(), OcrEngineType::Paddle);
    }

    #[test]
    fn test_engine_type_serde() {
        let json = serde_json::to_string(&OcrEngineType::Tesseract).unwrap();
        assert_eq!(json, "\"tesseract\"");
        let back: OcrEngineType = serde_json::from_str("\"paddle\"").unwrap();
        assert_eq!(back, OcrEngineType::Paddle);
    }

    #[test]
    fn test_tesseract_defaults() {
        let config = TesseractConfig::default();
        assert_eq!(config.binary_or_default(), "tesseract");
        assert_eq!(config.lang_or_default(), "eng");
        assert_eq!(config.psm_or_default(), 6);
        assert_eq!(config.oem_or_default(), 3);
    }
}
