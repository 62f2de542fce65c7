use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("Invalid metadata: {0}")]
    MetadataError(String),

    #[error("Caption generation error: {0}")]
    CaptionError(String),

    #[error("Caption burn-in error: {0}")]
    BurnInError(String),

    #[error("Translation error: {0}")]
    TranslationError(String),

    #[error("Upload error: {0}")]
    UploadError(String),

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimeoutError { program: String, timeout: Duration },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
