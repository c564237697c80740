use std::path::Path;
use std::process::Command;

use ::image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::ExtractionError;

/// Optical character recognition over a decoded image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractionError>;
}

/// Runs the `tesseract` command-line tool on a temporary PNG rendition of the
/// image.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            language: config.language.clone(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(&OcrConfig::default())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        let input = tempfile::Builder::new()
            .prefix("medicai-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| ExtractionError::Ocr(format!("failed to run {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Ocr(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Decode the image at `path` and hand it to the OCR engine.
pub fn extract_image(path: &Path, ocr: &dyn OcrEngine) -> Result<String, ExtractionError> {
    let image = ::image::open(path)?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Decoded image for OCR"
    );
    ocr.recognize(&image)
}
