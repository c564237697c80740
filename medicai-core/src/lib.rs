pub mod assistant;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod interpret;
pub mod models;
pub mod prompt;

// Re-export commonly used types
pub use assistant::MedicalAssistant;
pub use client::{ChatCompletion, LlmClient, OpenAiClient};
pub use config::{LlmConfig, OcrConfig};
pub use error::{ExtractionError, MedicError, Result};
pub use extract::{DocumentExtractor, OcrEngine, TesseractOcr};
pub use interpret::{Fallback, interpret, interpret_reply, parse_reply};
pub use models::{
    Analysis, Confidence, Diagnosis, DiagnosisList, ExtractedDocument, ExtractedSection,
    FileFormat, SoapSummary, UploadedFile,
};
pub use prompt::{ChatRequest, DiagnosticRequest, PromptPayload, PromptTemplate};
