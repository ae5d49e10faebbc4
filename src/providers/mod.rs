/*!
 * Provider implementations for different translation backends.
 *
 * This module contains client implementations for the supported backends:
 * - Ollama: local LLM server
 * - OpenAI: hosted chat-completions API
 * - Anthropic: hosted messages API
 * - Mock: in-process backend for tests and dry runs
 *
 * All backends sit behind the [`TranslationBackend`] trait and are resolved
 * through a [`ProviderRegistry`], so the pipeline never branches on provider
 * names. Backends never retry; the orchestrator owns the single backoff
 * policy shared by all providers.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::debug;

use crate::app_config::{ProviderKind, TranslationConfig};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod markers;
pub mod mock;
pub mod ollama;
pub mod openai;

/// One batch translation request as seen by a backend
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Source texts in ordinal order
    pub texts: Vec<String>,
    /// Source language code
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

/// Common trait for all translation backends.
///
/// The contract is strict about alignment: the returned vector has exactly
/// one translated string per input text, index-aligned. Implementations must
/// reject any response they cannot align as [`ProviderError::MalformedResponse`]
/// so the pipeline never sees reordered or merged output.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Which provider this backend talks to
    fn kind(&self) -> ProviderKind;

    /// Translate a batch, preserving index alignment
    async fn translate_batch(&self, request: &BatchRequest)
        -> Result<Vec<String>, ProviderError>;

    /// Cheap connectivity probe used at worker startup
    async fn check_connectivity(&self) -> Result<(), ProviderError>;
}

/// Validate the alignment half of the backend contract.
///
/// Shared by all adapters: a response that does not contain exactly one
/// string per input unit is rejected at the boundary.
pub fn ensure_aligned(
    translated: Vec<String>,
    expected: usize,
) -> Result<Vec<String>, ProviderError> {
    if translated.len() != expected {
        return Err(ProviderError::MalformedResponse(format!(
            "expected {} translated segments, got {}",
            expected,
            translated.len()
        )));
    }
    Ok(translated)
}

/// Parse a Retry-After header into a duration hint
pub(crate) fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a reqwest transport error onto the provider taxonomy
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable("request timed out".to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

/// Registry mapping provider identifiers to backend implementations.
///
/// New providers are added by implementing [`TranslationBackend`] and
/// registering here, never by branching inside the pipeline.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: HashMap<ProviderKind, Arc<dyn TranslationBackend>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own kind, replacing any previous one
    pub fn register(&mut self, backend: Arc<dyn TranslationBackend>) {
        debug!("registering provider backend: {}", backend.kind());
        self.backends.insert(backend.kind(), backend);
    }

    /// Look up the backend for a provider
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn TranslationBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Kinds with a registered backend
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.backends.keys().copied().collect()
    }

    /// Build a registry with one client per configured provider.
    ///
    /// The mock backend is always registered so dry-run jobs work without
    /// network access.
    pub fn from_config(config: &TranslationConfig) -> Self {
        let mut registry = Self::new();
        for provider in &config.available_providers {
            match provider.kind() {
                Ok(ProviderKind::Ollama) => {
                    registry.register(Arc::new(ollama::OllamaBackend::new(
                        &provider.endpoint,
                        Duration::from_secs(provider.timeout_secs),
                    )));
                }
                Ok(ProviderKind::OpenAI) => {
                    registry.register(Arc::new(openai::OpenAIBackend::new(
                        &provider.api_key,
                        &provider.endpoint,
                        Duration::from_secs(provider.timeout_secs),
                    )));
                }
                Ok(ProviderKind::Anthropic) => {
                    registry.register(Arc::new(anthropic::AnthropicBackend::new(
                        &provider.api_key,
                        &provider.endpoint,
                        Duration::from_secs(provider.timeout_secs),
                    )));
                }
                Ok(ProviderKind::Mock) => {}
                Err(e) => {
                    log::warn!("skipping provider with unknown type: {}", e);
                }
            }
        }
        registry.register(Arc::new(mock::MockBackend::echo()));
        registry
    }

    /// Probe connectivity of every registered backend concurrently.
    ///
    /// Returns the kinds that failed together with their errors.
    pub async fn check_all(&self) -> Vec<(ProviderKind, ProviderError)> {
        let probes = self.backends.values().map(|backend| {
            let backend = backend.clone();
            async move { (backend.kind(), backend.check_connectivity().await) }
        });
        join_all(probes)
            .await
            .into_iter()
            .filter_map(|(kind, result)| result.err().map(|e| (kind, e)))
            .collect()
    }
}
