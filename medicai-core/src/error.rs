use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the analysis pipeline.
#[derive(Debug, Error)]
pub enum MedicError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM request failed: {0}")]
    LlmRequest(#[from] reqwest::Error),

    #[error("LLM API returned HTTP {status}: {message}")]
    LlmApi { status: u16, message: String },

    #[error("Invalid response format from LLM: {0}")]
    LlmResponseFormat(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl MedicError {
    /// Configuration errors are the only class the public operations propagate.
    pub fn is_config(&self) -> bool {
        matches!(self, MedicError::Config(_))
    }
}

/// Per-format extraction failures. These never leave the extractor; they are
/// rendered into the document text instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Pdf(#[from] lopdf::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] roxmltree::Error),

    #[error("{0}")]
    Ocr(String),
}

pub type Result<T> = std::result::Result<T, MedicError>;
