use std::path::Path;

use tracing::debug;

use crate::error::ExtractionError;

/// Read a plain-text file as UTF-8, falling back to Latin-1 when the bytes are
/// not valid UTF-8.
pub fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path)?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            debug!(path = %path.display(), "Not valid UTF-8, decoding as Latin-1");
            Ok(decode_latin1(e.as_bytes()))
        }
    }
}

// Latin-1 maps each byte to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
