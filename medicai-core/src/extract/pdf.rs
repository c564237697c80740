use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::ExtractionError;

/// Concatenate the text of every page, each followed by a newline. Pages whose
/// text cannot be decoded contribute nothing but their newline.
pub fn extract_pdf(path: &Path) -> Result<String, ExtractionError> {
    let document = Document::load(path)?;
    let pages = document.get_pages();
    debug!(path = %path.display(), pages = pages.len(), "Loaded PDF");

    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => warn!(page = page_number, error = %e, "No text on PDF page"),
        }
        text.push('\n');
    }

    Ok(text)
}
