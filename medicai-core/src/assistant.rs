use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::client::LlmClient;
use crate::config::LlmConfig;
use crate::error::{MedicError, Result};
use crate::extract::DocumentExtractor;
use crate::interpret::{Fallback, interpret};
use crate::models::{Analysis, DiagnosisList, SoapSummary, UploadedFile};
use crate::prompt::{ChatRequest, DiagnosticRequest, PromptPayload, PromptTemplate};

/// Runs documents through extraction, prompting, the model and reply
/// interpretation.
#[derive(Clone)]
pub struct MedicalAssistant {
    client: Arc<dyn LlmClient>,
    extractor: DocumentExtractor,
    config: LlmConfig,
}

impl MedicalAssistant {
    pub fn new(client: Arc<dyn LlmClient>, extractor: DocumentExtractor, config: LlmConfig) -> Self {
        Self {
            client,
            extractor,
            config,
        }
    }

    /// SOAP summary of the given documents.
    pub async fn patient_summary(&self, paths: &[PathBuf]) -> Result<Analysis<SoapSummary>> {
        self.analyze(paths, PromptTemplate::Summary).await
    }

    /// Preliminary differential diagnoses for the given documents.
    pub async fn preliminary_diagnosis(&self, paths: &[PathBuf]) -> Result<Analysis<DiagnosisList>> {
        self.analyze(paths, PromptTemplate::Diagnosis).await
    }

    async fn analyze<T: Fallback>(
        &self,
        paths: &[PathBuf],
        template: PromptTemplate,
    ) -> Result<Analysis<T>> {
        info!("Starting {:?} analysis of {} files", template, paths.len());

        let files = paths.iter().cloned().map(UploadedFile::new).collect();
        let request = DiagnosticRequest::new(files, template);
        let outcome = self.call_model(request).await;
        let analysis = interpret(outcome)?;

        info!(
            fallback = analysis.is_fallback(),
            "{:?} analysis completed", template
        );
        Ok(analysis)
    }

    async fn call_model(&self, request: DiagnosticRequest) -> Result<String> {
        let extractor = self.extractor.clone();
        let payload = tokio::task::spawn_blocking(move || PromptPayload::build(&request, &extractor))
            .await
            .map_err(|e| MedicError::Task(e.to_string()))??;

        let chat_request = ChatRequest::new(&self.config, payload);
        let completion = self.client.complete(&chat_request).await?;
        Ok(completion.reply()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::MockLlmClient;
    use crate::extract::test_support::extractor_with_ocr;
    use crate::models::Confidence;
    use crate::prompt::MessageContent;
    use serde_json::json;

    fn assistant(client: Arc<MockLlmClient>) -> MedicalAssistant {
        MedicalAssistant::new(
            client,
            extractor_with_ocr("unused"),
            LlmConfig::builder("sk-test").model("test-model").build(),
        )
    }

    fn notes_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "65 year old, crushing chest pain").unwrap();
        path
    }

    #[tokio::test]
    async fn summary_returns_model_json() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::with_reply(
            r#"{"subjective":"a","objective":"b","assessment":"c","plan":"d"}"#,
        ));

        let analysis = assistant(client.clone())
            .patient_summary(&[notes_file(&dir)])
            .await
            .unwrap();

        assert_eq!(
            analysis,
            Analysis::Structured(
                json!({"subjective": "a", "objective": "b", "assessment": "c", "plan": "d"})
            )
        );

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        let MessageContent::Text(prompt) = &requests[0].messages[1].content else {
            panic!("expected a text prompt");
        };
        assert!(prompt.contains("--- Content from notes.txt ---\n65 year old, crushing chest pain"));
    }

    #[tokio::test]
    async fn transport_failure_yields_sentinel_diagnosis() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::with_error(MedicError::LlmApi {
            status: 502,
            message: "bad gateway".into(),
        }));

        let analysis = assistant(client)
            .preliminary_diagnosis(&[notes_file(&dir)])
            .await
            .unwrap();

        let Analysis::Fallback(list) = analysis else {
            panic!("expected fallback");
        };
        assert_eq!(list.diagnoses.len(), 1);
        assert_eq!(list.diagnoses[0].confidence, Confidence::NotAvailable);
        assert!(list.diagnoses[0].explanation.contains("bad gateway"));
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_call_failure() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::new(vec![Ok(
            crate::client::ChatCompletion {
                choices: Vec::new(),
                usage: None,
            },
        )]));

        let analysis = assistant(client)
            .patient_summary(&[notes_file(&dir)])
            .await
            .unwrap();

        let Analysis::Fallback(summary) = analysis else {
            panic!("expected fallback");
        };
        assert_eq!(summary.subjective, "Error calling LLM API");
        assert!(summary.objective.contains("choices[0].message.content"));
    }

    #[tokio::test]
    async fn unreadable_vision_image_is_a_call_failure() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::always("{}"));

        let analysis = assistant(client.clone())
            .patient_summary(&[dir.path().join("missing.jpeg")])
            .await
            .unwrap();

        assert!(analysis.is_fallback());
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn configuration_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::with_error(MedicError::Config(
            "OPENAI_API_KEY missing".into(),
        )));

        let result = assistant(client).patient_summary(&[notes_file(&dir)]).await;
        assert!(matches!(result, Err(MedicError::Config(_))));
    }

    #[tokio::test]
    async fn repeated_summaries_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::always(
            "Here it is: {\"subjective\": \"chest pain\", \"plan\": \"ECG\"}",
        ));
        let assistant = assistant(client);
        let paths = [notes_file(&dir)];

        let first = assistant.patient_summary(&paths).await.unwrap();
        let second = assistant.patient_summary(&paths).await.unwrap();
        assert_eq!(first, second);
    }
}
