/*!
 * Anthropic backend for the hosted messages API.
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
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

/// API version header value
const API_VERSION: &str = "2023-06-01";

/// Generation cap for one batch response
const MAX_TOKENS: u32 = 8192;

/// Anthropic message format
#[derive(Debug, Serialize)]
struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    role: String,
    /// Content of the message
    content: String,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    /// The model to use
    model: String,
    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,
    /// System prompt to guide the model
    system: String,
    /// Maximum number of tokens to generate
    max_tokens: u32,
    /// Temperature for generation
    temperature: f32,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    content_type: String,
    /// The actual text content
    #[serde(default)]
    text: String,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    /// The content blocks of the response
    content: Vec<AnthropicContent>,
}

/// Client for the Anthropic messages API
pub struct AnthropicBackend {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend
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

    async fn complete(&self, body: &AnthropicRequest) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
                error!("Anthropic API error ({}): {}", status, text);
                return Err(ProviderError::Unavailable(format!(
                    "Anthropic API error ({status}): {text}"
                )));
            }
            _ => {}
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect();
        if text.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "response has no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl TranslationBackend for AnthropicBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn translate_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<Vec<String>, ProviderError> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: markers::frame(&request.texts),
            }],
            system: markers::system_prompt(&request.source_lang, &request.target_lang),
            max_tokens: MAX_TOKENS,
            temperature: request.temperature,
        };

        let content = self.complete(&body).await?;
        let segments = markers::split(&content, request.texts.len())?;
        ensure_aligned(segments, request.texts.len())
    }

    async fn check_connectivity(&self) -> Result<(), ProviderError> {
        let body = AnthropicRequest {
            model: "claude-3-haiku-20240307".to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "ping".to_string(),
            }],
            system: String::new(),
            max_tokens: 8,
            temperature: 0.0,
        };
        self.complete(&body).await.map(|_| ())
    }
}
