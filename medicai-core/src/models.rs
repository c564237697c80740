use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Formats the extractor knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Image,
    Text,
    Docx,
}

impl FileFormat {
    /// Infer the format from an extension, ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileFormat::Pdf),
            "png" | "jpg" | "jpeg" => Some(FileFormat::Image),
            "txt" => Some(FileFormat::Text),
            "docx" => Some(FileFormat::Docx),
            _ => None,
        }
    }
}

/// A stored upload. `format` is `None` when the extension is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub format: Option<FileFormat>,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(FileFormat::from_extension);
        Self { path, format }
    }

    /// Lowercased extension, or the empty string when there is none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }

    pub fn is_image(&self) -> bool {
        self.format == Some(FileFormat::Image)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Text pulled out of one file, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub source: String,
    pub text: String,
}

/// All sections of one extraction run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub sections: Vec<ExtractedSection>,
}

impl ExtractedDocument {
    /// Render the combined blob: one `--- Content from <name> ---` block per
    /// file, blocks separated by a blank line.
    pub fn combined_text(&self) -> String {
        self.sections
            .iter()
            .map(|section| format!("--- Content from {} ---\n{}", section.source, section.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapSummary {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[serde(rename = "NA")]
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub name: String,
    pub explanation: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub follow_up: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisList {
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Outcome of one analysis: either whatever object the model produced, passed
/// through verbatim, or the degraded structure built locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis<T> {
    Structured(Value),
    Fallback(T),
}

impl<T> Analysis<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Analysis::Fallback(_))
    }
}

impl<T: Serialize> Analysis<T> {
    pub fn to_value(&self) -> Value {
        match self {
            Analysis::Structured(value) => value.clone(),
            Analysis::Fallback(fallback) => {
                serde_json::to_value(fallback).unwrap_or(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_is_inferred_case_insensitively() {
        assert_eq!(UploadedFile::new("a/scan.JPEG").format, Some(FileFormat::Image));
        assert_eq!(UploadedFile::new("notes.Txt").format, Some(FileFormat::Text));
        assert_eq!(UploadedFile::new("letter.docx").format, Some(FileFormat::Docx));
        assert_eq!(UploadedFile::new("labs.PDF").format, Some(FileFormat::Pdf));
        assert_eq!(UploadedFile::new("archive.zip").format, None);
        assert_eq!(UploadedFile::new("README").format, None);
    }

    #[test]
    fn combined_text_tags_each_section() {
        let document = ExtractedDocument {
            sections: vec![
                ExtractedSection {
                    source: "a.txt".into(),
                    text: "first".into(),
                },
                ExtractedSection {
                    source: "b.txt".into(),
                    text: "second".into(),
                },
            ],
        };

        assert_eq!(
            document.combined_text(),
            "--- Content from a.txt ---\nfirst\n\n--- Content from b.txt ---\nsecond"
        );
    }

    #[test]
    fn confidence_na_serializes_as_literal() {
        assert_eq!(serde_json::to_value(Confidence::NotAvailable).unwrap(), json!("NA"));
        assert_eq!(serde_json::to_value(Confidence::High).unwrap(), json!("High"));
    }

    #[test]
    fn structured_analysis_serializes_verbatim() {
        let value = json!({"subjective": "a", "extra": [1, 2]});
        let analysis: Analysis<SoapSummary> = Analysis::Structured(value.clone());
        assert_eq!(serde_json::to_value(&analysis).unwrap(), value);
        assert_eq!(analysis.to_value(), value);
    }
}
