//! Multi-format text extraction.
//!
//! Every entry point here is infallible from the caller's point of view: a file
//! that cannot be read becomes a line of explanatory text in the output so a
//! batch always runs to completion.

pub mod docx;
pub mod image;
pub mod pdf;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::OcrConfig;
use crate::models::{ExtractedDocument, ExtractedSection, FileFormat, UploadedFile};

pub use self::image::{OcrEngine, TesseractOcr};

/// Dispatches files to the format-specific readers.
#[derive(Clone)]
pub struct DocumentExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    pub fn with_tesseract(config: &OcrConfig) -> Self {
        Self::new(Arc::new(TesseractOcr::new(config)))
    }

    /// Extract the text of a single file.
    pub fn extract_file(&self, file: &UploadedFile) -> String {
        let Some(format) = file.format else {
            warn!(path = %file.path.display(), "Unsupported file type");
            return format!("Unsupported file type: {}", file.extension());
        };

        let path: &Path = &file.path;
        let result = match format {
            FileFormat::Pdf => pdf::extract_pdf(path).map_err(|e| ("PDF", e)),
            FileFormat::Image => image::extract_image(path, self.ocr.as_ref()).map_err(|e| ("image", e)),
            FileFormat::Text => text::extract_text(path).map_err(|e| ("text file", e)),
            FileFormat::Docx => docx::extract_docx(path).map_err(|e| ("DOCX", e)),
        };

        match result {
            Ok(text) => {
                debug!(path = %path.display(), chars = text.len(), "Extracted text");
                text
            }
            Err((kind, e)) => {
                warn!(path = %path.display(), error = %e, "Text extraction failed");
                format!("Error extracting text from {kind}: {e}")
            }
        }
    }

    /// Extract every file, keeping input order and tagging each section with
    /// its source file name.
    pub fn extract_all(&self, files: &[UploadedFile]) -> ExtractedDocument {
        info!("Extracting text from {} files", files.len());

        let sections = files
            .iter()
            .map(|file| ExtractedSection {
                source: file.file_name(),
                text: self.extract_file(file),
            })
            .collect();

        ExtractedDocument { sections }
    }
}
