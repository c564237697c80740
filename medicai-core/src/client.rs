use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::LlmConfig;
use crate::error::{MedicError, Result};
use crate::prompt::ChatRequest;

/// Top-level envelope returned by a chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChatCompletion {
    /// Wrap a reply string in a single-choice envelope.
    pub fn from_reply(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ReplyMessage {
                    content: Some(content.into()),
                },
            }],
            usage: None,
        }
    }

    /// The reply text at `choices[0].message.content`.
    pub fn reply(&self) -> Result<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| {
                MedicError::LlmResponseFormat("missing choices[0].message.content".into())
            })
    }
}

/// Anything that maps a chat request to a reply envelope.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;
}

/// OpenAI-compatible chat-completion client. One call per request, no retries.
///
/// Debug is deliberately not derived: the struct holds the API key.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(MedicError::Config(
                "OpenAI API key not found. Please set OPENAI_API_KEY in your environment variables."
                    .into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        info!(model = %request.model, "Calling chat-completion endpoint");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "LLM API request failed");
            return Err(MedicError::LlmApi {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| MedicError::LlmResponseFormat(e.to_string()))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM usage"
            );
        }

        Ok(completion)
    }
}

/// Test utilities for the LLM client.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Mock LLM client. Replays pre-configured outcomes in order and records
    /// every request it receives.
    pub struct MockLlmClient {
        outcomes: Mutex<Vec<Result<ChatCompletion>>>,
        repeat: Option<String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockLlmClient {
        pub fn new(outcomes: Vec<Result<ChatCompletion>>) -> Self {
            // Reversed so outcomes can be popped from the end
            let mut outcomes = outcomes;
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                repeat: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_reply(content: &str) -> Self {
            Self::new(vec![Ok(ChatCompletion::from_reply(content))])
        }

        /// Answer every request with the same reply.
        pub fn always(content: &str) -> Self {
            Self {
                repeat: Some(content.to_string()),
                ..Self::new(Vec::new())
            }
        }

        pub fn with_error(error: MedicError) -> Self {
            Self::new(vec![Err(error)])
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if let Some(reply) = &self.repeat {
                return Ok(ChatCompletion::from_reply(reply.clone()));
            }
            let mut outcomes = self
                .outcomes
                .lock()
                .map_err(|e| MedicError::LlmResponseFormat(format!("mock lock poisoned: {e}")))?;
            outcomes
                .pop()
                .unwrap_or_else(|| Err(MedicError::LlmResponseFormat("no mock reply left".into())))
        }
    }
}
