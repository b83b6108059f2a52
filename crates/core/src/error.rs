use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Input image not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid file format. Expected JPEG, got: {0}")]
    NotJpeg(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pattern table: {0}")]
    Patterns(#[from] docshield_rules::PatternError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
