use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::{MedicError, Result};
use crate::extract::DocumentExtractor;
use crate::models::UploadedFile;

pub const SYSTEM_PROMPT: &str = "You are a medical AI assistant helping doctors analyze patient documents and provide clinical insights.";

const SUMMARY_PROMPT: &str = "Please analyze these patient documents and provide a comprehensive patient summary in SOAP format:

1. Subjective: Patient's reported symptoms, complaints, and history
2. Objective: Clinical findings, vital signs, examination results, and test results
3. Assessment: Clinical impression, diagnosis or differential diagnoses
4. Plan: Treatment plan, medications, follow-up

Format your response as a JSON object with the keys \"subjective\", \"objective\", \"assessment\" and \"plan\".
If any component is unclear from the documents, note this in your response.";

const DIAGNOSIS_PROMPT: &str = "Based on these patient documents, provide 3-5 preliminary diagnoses that a doctor should consider, ranked from most to least likely.

For each potential diagnosis:
1. Provide a brief explanation of why this diagnosis should be considered
2. List supporting evidence from the documents
3. Assign a confidence level (High, Medium, Low)
4. Suggest follow-up tests or questions that would help confirm or rule out this diagnosis

Format your response as a JSON object of the form
{\"diagnoses\": [{\"name\": \"...\", \"explanation\": \"...\", \"evidence\": [\"...\"], \"confidence\": \"High|Medium|Low\", \"follow_up\": [\"...\"]}]}";

/// Which artifact a request asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    Summary,
    Diagnosis,
}

impl PromptTemplate {
    pub fn instructions(&self) -> &'static str {
        match self {
            PromptTemplate::Summary => SUMMARY_PROMPT,
            PromptTemplate::Diagnosis => DIAGNOSIS_PROMPT,
        }
    }
}

/// Files plus the template to run them through.
#[derive(Debug, Clone)]
pub struct DiagnosticRequest {
    files: Vec<UploadedFile>,
    template: PromptTemplate,
}

impl DiagnosticRequest {
    pub fn new(files: Vec<UploadedFile>, template: PromptTemplate) -> Self {
        Self { files, template }
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn template(&self) -> PromptTemplate {
        self.template
    }

    pub fn has_images(&self) -> bool {
        self.files.iter().any(UploadedFile::is_image)
    }
}

/// An image inlined into a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: &'static str,
    pub base64: String,
}

impl ImageAttachment {
    pub fn from_file(file: &UploadedFile) -> Result<Self> {
        let bytes = std::fs::read(&file.path).map_err(|source| MedicError::Io {
            path: file.path.clone(),
            source,
        })?;
        let mime_type = match file.extension().as_str() {
            "png" => "image/png",
            _ => "image/jpeg",
        };
        Ok(Self {
            mime_type,
            base64: STANDARD.encode(bytes),
        })
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// User-message payload. Text and vision requests never mix: a vision
/// request carries no extracted text and a text request carries no images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPayload {
    Text { prompt: String },
    Vision { prompt: String, images: Vec<ImageAttachment> },
}

impl PromptPayload {
    /// Choose the mode from the request's files and build the payload.
    ///
    /// Text extraction is blocking I/O; call this off the async executor.
    pub fn build(request: &DiagnosticRequest, extractor: &DocumentExtractor) -> Result<Self> {
        let instructions = request.template().instructions();

        if request.has_images() {
            let skipped = request.files().iter().filter(|f| !f.is_image()).count();
            if skipped > 0 {
                warn!("Vision request: ignoring {} non-image files", skipped);
            }

            let images = request
                .files()
                .iter()
                .filter(|f| f.is_image())
                .map(ImageAttachment::from_file)
                .collect::<Result<Vec<_>>>()?;
            info!("Built vision prompt with {} images", images.len());

            return Ok(PromptPayload::Vision {
                prompt: instructions.to_string(),
                images,
            });
        }

        let prompt = if request.files().is_empty() {
            instructions.to_string()
        } else {
            let document = extractor.extract_all(request.files());
            format!(
                "{}\n\nDocument Content:\n{}",
                instructions,
                document.combined_text()
            )
        };
        info!("Built text prompt ({} characters)", prompt.len());

        Ok(PromptPayload::Text { prompt })
    }

    fn into_content(self) -> MessageContent {
        match self {
            PromptPayload::Text { prompt } => MessageContent::Text(prompt),
            PromptPayload::Vision { prompt, images } => {
                let mut parts = vec![ContentPart::Text { text: prompt }];
                parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_uri(),
                    },
                }));
                MessageContent::Parts(parts)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// Body of a chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(config: &LlmConfig, payload: PromptPayload) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: Role::User,
                    content: payload.into_content(),
                },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}
