/*!
 * Ollama backend for a local model server.
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

/// Generate request for the Ollama API
#[derive(Debug, Serialize)]
struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    system: String,
    /// Whether to stream the response
    stream: bool,
    /// Additional model parameters
    options: GenerationOptions,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize)]
struct GenerationOptions {
    /// Temperature for generation
    temperature: f32,
}

/// Generation response from the Ollama API
#[derive(Debug, Deserialize)]
struct GenerationResponse {
    /// Generated text
    response: String,
}

/// Client for a local Ollama server
pub struct OllamaBackend {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend for the given endpoint.
    ///
    /// A bare `host:port` endpoint gets an `http://` scheme prepended.
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };

        Self {
            base_url,
            client: Client::builder()
                .timeout(timeout)
                // Ollama speaks HTTP/1.1; keep connections alive for
                // back-to-back batch requests.
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn translate_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = GenerationRequest {
            model: request.model.clone(),
            prompt: markers::frame(&request.texts),
            system: markers::system_prompt(&request.source_lang, &request.target_lang),
            stream: false,
            options: GenerationOptions {
                temperature: request.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after_from_headers(response.headers()),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Ollama API error ({}): {}", status, text);
            return Err(ProviderError::Unavailable(format!(
                "Ollama API error ({status}): {text}"
            )));
        }

        let generated: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let segments = markers::split(&generated.response, request.texts.len())?;
        ensure_aligned(segments, request.texts.len())
    }

    async fn check_connectivity(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "Ollama version probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
