/*!
 * Common test utilities for the doctrans test suite
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tempfile::TempDir;
use tokio::sync::watch;

use doctrans::app_config::{Config, ProviderKind};
use doctrans::document::model::{Block, BoundingBox, Page, PagedDocument};
use doctrans::jobs::{Job, JobStore, Orchestrator, SqliteQueue};
use doctrans::providers::mock::MockBackend;
use doctrans::providers::ProviderRegistry;
use doctrans::storage::FsArtifactStore;

/// Standard US-letter page size used by the test documents
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// Build a text block at the given vertical slot
pub fn text_block(text: &str, y0: f32) -> Block {
    Block::text(
        text,
        "Times",
        10.0,
        BoundingBox::new(50.0, y0, 450.0, y0 + 20.0),
    )
}

/// Build a page from blocks
pub fn page(index: usize, blocks: Vec<Block>) -> Page {
    Page {
        index,
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        blocks,
    }
}

/// Build a document with the given number of single-sentence units per page.
///
/// Every text ends with a period so each unit forms its own group, and
/// blocks are laid out top to bottom in submission order.
pub fn doc_with_units(units_per_page: &[usize]) -> PagedDocument {
    let pages = units_per_page
        .iter()
        .enumerate()
        .map(|(page_index, &count)| {
            let blocks = (0..count)
                .map(|i| {
                    text_block(
                        &format!("Paragraph {}-{} text.", page_index, i),
                        50.0 + i as f32 * 30.0,
                    )
                })
                .collect();
            page(page_index, blocks)
        })
        .collect();
    PagedDocument::new(pages)
}

/// Serialize a document for submission
pub fn doc_bytes(document: &PagedDocument) -> Vec<u8> {
    document.to_bytes().expect("test document serializes")
}

/// Orchestrator wired to an in-memory store/queue, a temp-dir artifact
/// store, and a single scripted mock backend
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub backend: Arc<MockBackend>,
    _artifact_dir: TempDir,
}

/// Build a harness around the given mock, with config tweaks applied
pub fn harness_with(backend: MockBackend, tweak: impl FnOnce(&mut Config)) -> Result<TestHarness> {
    let mut config = Config::default();
    config.translation.provider = ProviderKind::Mock;
    // Keep retries and polling fast under test.
    config.job.retry_backoff_ms = 1;
    config.job.poll_interval_ms = 10;
    config.job.lease_ttl_secs = 60;
    tweak(&mut config);

    let store = JobStore::new_in_memory()?;
    let queue = Arc::new(SqliteQueue::new(store.database().clone()));
    let artifact_dir = TempDir::new()?;
    let artifacts = Arc::new(FsArtifactStore::new(artifact_dir.path())?);

    let backend = Arc::new(backend);
    let mut registry = ProviderRegistry::new();
    registry.register(backend.clone());

    let orchestrator = Orchestrator::new(config, store, queue, artifacts, registry);
    Ok(TestHarness {
        orchestrator,
        backend,
        _artifact_dir: artifact_dir,
    })
}

/// Build a harness with default config tweaks
pub fn harness(backend: MockBackend) -> Result<TestHarness> {
    harness_with(backend, |_| {})
}

/// Set the mock provider's unit capacity in the config
pub fn set_mock_unit_capacity(config: &mut Config, max_units: usize) {
    for provider in &mut config.translation.available_providers {
        if provider.provider_type == "mock" {
            provider.max_units_per_request = max_units;
        }
    }
}

/// Poll the record until the job reaches a terminal state
pub async fn wait_terminal(
    orchestrator: &Orchestrator,
    job_id: &str,
    timeout: Duration,
) -> Result<Job> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(job) = orchestrator.get_status(job_id).await? {
            if job.state.is_terminal() {
                return Ok(job);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("job {} did not reach a terminal state", job_id));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run one worker loop until the job terminates, then shut the worker down
pub async fn process_until_terminal(
    harness: &TestHarness,
    job_id: &str,
    timeout: Duration,
) -> Result<Job> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = harness.orchestrator.clone();
    let worker = tokio::spawn(async move { orchestrator.run_worker(shutdown_rx).await });

    let result = wait_terminal(&harness.orchestrator, job_id, timeout).await;

    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    result
}
