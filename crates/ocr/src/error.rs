use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("image processing failed: {0}")]
    ImageProcess(String),

    #[error("inference failed: {0}")]
    Inference(String),

    /// Backend binary or models missing
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
