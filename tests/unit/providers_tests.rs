/*!
 * Tests for provider framing, the mock backend, and the registry
 */

use std::time::Duration;

use doctrans::app_config::{ProviderKind, TranslationConfig};
use doctrans::errors::ProviderError;
use doctrans::providers::mock::MockBackend;
use doctrans::providers::{
    ensure_aligned, markers, BatchRequest, ProviderRegistry, TranslationBackend,
};

fn request(texts: &[&str]) -> BatchRequest {
    BatchRequest {
        texts: texts.iter().map(|t| t.to_string()).collect(),
        source_lang: "en".to_string(),
        target_lang: "ja".to_string(),
        model: "echo".to_string(),
        temperature: 0.3,
    }
}

#[test]
fn test_frame_andSplit_shouldRoundTrip() {
    let texts = vec![
        "First segment.".to_string(),
        "Second segment\nwith a newline.".to_string(),
        "Third.".to_string(),
    ];

    let framed = markers::frame(&texts);
    let split = markers::split(&framed, texts.len()).unwrap();

    assert_eq!(split, texts);
}

#[test]
fn test_split_withMissingMarker_shouldFailMalformed() {
    let response = "<<UNIT_0>>\nfirst\n<<END>>";
    let result = markers::split(response, 2);
    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[test]
fn test_split_withReorderedMarkers_shouldFailMalformed() {
    let response = "<<UNIT_1>>\nsecond\n<<UNIT_0>>\nfirst\n<<END>>";
    let result = markers::split(response, 2);
    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[test]
fn test_split_withMissingEndMarker_shouldFailMalformed() {
    let response = "<<UNIT_0>>\nfirst\n<<UNIT_1>>\nsecond";
    let result = markers::split(response, 2);
    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[test]
fn test_ensure_aligned_withCountMismatch_shouldFailMalformed() {
    let result = ensure_aligned(vec!["one".to_string()], 2);
    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_mock_echo_shouldReturnInputAligned() {
    let backend = MockBackend::echo();
    let req = request(&["alpha", "beta", "gamma"]);

    let out = backend.translate_batch(&req).await.unwrap();

    assert_eq!(out, req.texts);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_mock_failTimes_shouldRecoverAfterConfiguredFailures() {
    let backend = MockBackend::fail_times(ProviderError::RateLimited { retry_after: None }, 2);
    let req = request(&["alpha"]);

    assert!(matches!(
        backend.translate_batch(&req).await,
        Err(ProviderError::RateLimited { .. })
    ));
    assert!(matches!(
        backend.translate_batch(&req).await,
        Err(ProviderError::RateLimited { .. })
    ));
    assert_eq!(backend.translate_batch(&req).await.unwrap(), req.texts);
}

#[tokio::test]
async fn test_mock_shortOutput_shouldDropOneSegment() {
    let backend = MockBackend::short_output();
    let req = request(&["alpha", "beta"]);

    let out = backend.translate_batch(&req).await.unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn test_providerError_retryability_shouldMatchTaxonomy() {
    assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
    assert!(ProviderError::Unavailable("down".into()).is_retryable());
    assert!(ProviderError::MalformedResponse("bad".into()).is_retryable());
    assert!(!ProviderError::AuthRejected("bad key".into()).is_retryable());

    let hinted = ProviderError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
    };
    assert_eq!(hinted.retry_after(), Some(Duration::from_secs(7)));
}

#[test]
fn test_registry_withRegisteredBackend_shouldResolveByKind() {
    let mut registry = ProviderRegistry::new();
    registry.register(std::sync::Arc::new(MockBackend::echo()));

    assert!(registry.get(ProviderKind::Mock).is_some());
    assert!(registry.get(ProviderKind::OpenAI).is_none());
}

#[test]
fn test_registry_fromConfig_shouldAlwaysIncludeMock() {
    let registry = ProviderRegistry::from_config(&TranslationConfig::default());
    assert!(registry.get(ProviderKind::Mock).is_some());
    assert!(registry.get(ProviderKind::Ollama).is_some());
}
