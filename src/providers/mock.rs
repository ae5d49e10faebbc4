/*!
 * Mock backend for tests and dry runs.
 *
 * Scripted behaviors cover the failure taxonomy the orchestrator has to
 * handle:
 * - `MockBackend::echo()` - returns every text unchanged
 * - `MockBackend::tagged(tag)` - returns every text prefixed with a tag
 * - `MockBackend::fail_times(err, n)` - fails n times, then echoes
 * - `MockBackend::always_fail(err)` - fails every call
 * - `MockBackend::short_output()` - drops the last segment, simulating a
 *   backend that violates the alignment contract
 */

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::app_config::ProviderKind;
use crate::errors::ProviderError;
use crate::providers::{BatchRequest, TranslationBackend};

/// Behavior mode for the mock backend
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return each text unchanged
    Echo,
    /// Return each text prefixed with a tag
    Tagged(String),
    /// Fail the first `times` calls with the given error, then echo
    FailTimes {
        /// Error returned while failing
        error: ProviderError,
        /// Number of failing calls
        times: usize,
    },
    /// Fail every call with the given error
    AlwaysFail(ProviderError),
    /// Return one segment fewer than requested
    ShortOutput,
}

/// In-process backend with scripted behavior
pub struct MockBackend {
    behavior: MockBehavior,
    calls: AtomicUsize,
    requests: Mutex<Vec<BatchRequest>>,
}

impl MockBackend {
    /// Create a mock with the given behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Mock that echoes input unchanged
    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    /// Mock that prefixes every text with a tag
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::new(MockBehavior::Tagged(tag.into()))
    }

    /// Mock that fails `times` calls with `error`, then echoes
    pub fn fail_times(error: ProviderError, times: usize) -> Self {
        Self::new(MockBehavior::FailTimes { error, times })
    }

    /// Mock that fails every call with `error`
    pub fn always_fail(error: ProviderError) -> Self {
        Self::new(MockBehavior::AlwaysFail(error))
    }

    /// Mock that returns one segment fewer than requested
    pub fn short_output() -> Self {
        Self::new(MockBehavior::ShortOutput)
    }

    /// Number of translate calls received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn translate_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<Vec<String>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        match &self.behavior {
            MockBehavior::Echo => Ok(request.texts.clone()),
            MockBehavior::Tagged(tag) => Ok(request
                .texts
                .iter()
                .map(|t| format!("{tag}{t}"))
                .collect()),
            MockBehavior::FailTimes { error, times } => {
                if call < *times {
                    Err(error.clone())
                } else {
                    Ok(request.texts.clone())
                }
            }
            MockBehavior::AlwaysFail(error) => Err(error.clone()),
            MockBehavior::ShortOutput => {
                let mut texts = request.texts.clone();
                texts.pop();
                Ok(texts)
            }
        }
    }

    async fn check_connectivity(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
