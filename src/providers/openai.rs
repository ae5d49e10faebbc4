/*!
 * OpenAI backend for the hosted chat-completions API.
 *
 * Also covers OpenAI-compatible servers (Azure, self-hosted gateways) via a
 * custom endpoint.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::ProviderKind;
use crate::errors::ProviderError;
use crate::providers::{
    ensure_aligned, markers, retry_after_from_headers, transport_error, BatchRequest,
    TranslationBackend,
};

/// Default public API endpoint
const DEFAULT_ENDPOINT: &str = "https://api.openai.com";

/// Chat message object
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    role: String,
    /// Content of the message
    content: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    /// Model name
    model: String,
    /// Conversation messages
    messages: Vec<ChatMessage>,
    /// Sampling temperature
    temperature: f32,
}

/// One completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    /// Generated message
    message: ChatMessage,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    /// Completion choices, first one carries the answer
    choices: Vec<ChatChoice>,
}

/// Client for the OpenAI chat-completions API
pub struct OpenAIBackend {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> Self {
        let endpoint = if endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.to_string(),
            endpoint,
        }
    }

    async fn complete(&self, body: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::AuthRejected(text));
            }
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after: retry_after_from_headers(response.headers()),
                });
            }
            _ if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                error!("OpenAI API error ({}): {}", status, text);
                return Err(ProviderError::Unavailable(format!(
                    "OpenAI API error ({status}): {text}"
                )));
            }
            _ => {}
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("response has no choices".into()))
    }
}

#[async_trait]
impl TranslationBackend for OpenAIBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn translate_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<Vec<String>, ProviderError> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: markers::system_prompt(&request.source_lang, &request.target_lang),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: markers::frame(&request.texts),
                },
            ],
            temperature: request.temperature,
        };

        let content = self.complete(&body).await?;
        let segments = markers::split(&content, request.texts.len())?;
        ensure_aligned(segments, request.texts.len())
    }

    async fn check_connectivity(&self) -> Result<(), ProviderError> {
        let url = format!("{}/v1/models", self.endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        match response.status().as_u16() {
            401 | 403 => Err(ProviderError::AuthRejected(
                "API key rejected by models probe".to_string(),
            )),
            s if !response.status().is_success() => Err(ProviderError::Unavailable(format!(
                "models probe returned {s}"
            ))),
            _ => Ok(()),
        }
    }
}
