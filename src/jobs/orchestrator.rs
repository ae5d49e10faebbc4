/*!
 * Job orchestration.
 *
 * The orchestrator owns the task state machine: it persists job records,
 * feeds the durable queue, runs the worker loop that drives each job through
 * extract -> batch -> translate -> reassemble, applies the one retry policy
 * shared by all providers, and broadcasts a progress event after every
 * persisted transition.
 *
 * State is the source of truth: every transition is written through an
 * atomic conditional update before its event is emitted, so observers that
 * drop events can always reconcile through `get_status`.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::{broadcast, watch};

use crate::app_config::{Config, ProviderKind};
use crate::document::{LayoutExtractor, Reassembler};
use crate::errors::{AppError, ProviderError};
use crate::jobs::models::{Job, JobState, ProgressEvent};
use crate::jobs::queue::{Delivery, JobQueue, SqliteQueue};
use crate::jobs::store::{ClaimOutcome, JobStore};
use crate::language_utils::validate_language_pair;
use crate::providers::{BatchRequest, ProviderRegistry, TranslationBackend};
use crate::storage::{ArtifactRef, ArtifactStore, FsArtifactStore};
use crate::translation::batch::UnitBatcher;

/// Progress events buffered per subscriber before old ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-job filtered view of the progress stream
pub struct JobEvents {
    job_id: String,
    rx: broadcast::Receiver<ProgressEvent>,
}

impl JobEvents {
    /// Next event for this job, skipping other jobs and tolerating gaps.
    ///
    /// Returns `None` once the orchestrator is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("progress subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Owns the job state machine and the worker loop
#[derive(Clone)]
pub struct Orchestrator {
    config: Config,
    store: JobStore,
    queue: Arc<dyn JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: ProviderRegistry,
    events: broadcast::Sender<ProgressEvent>,
}

impl Orchestrator {
    /// Create an orchestrator over explicit collaborators.
    ///
    /// The store, queue and artifact store are handles passed in at
    /// construction; the orchestrator keeps no process-wide state.
    pub fn new(
        config: Config,
        store: JobStore,
        queue: Arc<dyn JobQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        registry: ProviderRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            store,
            queue,
            artifacts,
            registry,
            events,
        }
    }

    /// Build an orchestrator with the SQLite store/queue and filesystem
    /// artifact store under the configured data directory
    pub fn from_config(config: Config) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;
        let db = crate::database::DatabaseConnection::new_in_dir(&data_dir)?;
        let store = JobStore::new(db.clone());
        let queue = Arc::new(SqliteQueue::new(db));
        let artifacts = Arc::new(FsArtifactStore::new(data_dir.join("artifacts"))?);
        let registry = ProviderRegistry::from_config(&config.translation);
        Ok(Self::new(config, store, queue, artifacts, registry))
    }

    /// The job record store used by this orchestrator
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// The provider registry used by this orchestrator
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // =========================================================================
    // Submission-side interface
    // =========================================================================

    /// Accept a document for translation and enqueue it.
    ///
    /// Returns the job id immediately; the pipeline runs on a worker.
    pub async fn submit(
        &self,
        document: Bytes,
        source_lang: &str,
        target_lang: &str,
        provider: ProviderKind,
        model_ref: Option<String>,
    ) -> Result<String> {
        validate_language_pair(source_lang, target_lang)?;

        if self.registry.get(provider).is_none() {
            return Err(anyhow!(
                "no backend registered for provider '{}'",
                provider
            ));
        }

        let model_ref = match model_ref {
            Some(m) if !m.is_empty() => m,
            _ => self
                .config
                .translation
                .provider_config(provider)
                .map(|p| p.model.clone())
                .unwrap_or_default(),
        };

        let input_ref = self.artifacts.put(document).await?;
        let job = Job::new(
            source_lang,
            target_lang,
            provider,
            model_ref,
            input_ref,
            self.config.job.max_attempts,
        );

        self.store.insert(&job).await?;
        self.queue.enqueue(&job.id).await?;
        self.emit(&job.id, JobState::Pending, None);

        info!(
            "submitted job {} ({} -> {}, provider {})",
            job.id, job.source_lang, job.target_lang, job.provider
        );

        Ok(job.id)
    }

    /// Point-in-time read of the authoritative job record
    pub async fn get_status(&self, job_id: &str) -> Result<Option<Job>> {
        self.store.get(job_id).await
    }

    /// List jobs, optionally filtered by state
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list(state).await
    }

    /// Subscribe to progress events for all jobs
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Subscribe to progress events for one job
    pub fn subscribe_job(&self, job_id: &str) -> JobEvents {
        JobEvents {
            job_id: job_id.to_string(),
            rx: self.events.subscribe(),
        }
    }

    /// Request cooperative cancellation of a pending or processing job.
    ///
    /// A pending job fails immediately; a processing job observes the flag
    /// at its next between-batch checkpoint. Returns false when the job is
    /// unknown or already terminal.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        if !self.store.request_cancel(job_id).await? {
            return Ok(false);
        }
        // The claim excludes flagged jobs, so this transition cannot race a
        // worker picking the job up.
        if self
            .store
            .fail(job_id, JobState::Pending, "cancelled: cancellation requested")
            .await?
        {
            self.emit(job_id, JobState::Failed, Some("cancelled".to_string()));
        }
        Ok(true)
    }

    /// Delete a terminal job and its artifacts.
    ///
    /// Fails for jobs that are still pending or processing.
    pub async fn delete(&self, job_id: &str) -> Result<bool> {
        match self.store.delete_terminal(job_id).await? {
            Some(job) => {
                if let Err(e) = self.artifacts.delete(&job.input_ref).await {
                    warn!("failed to delete input artifact of {}: {}", job.id, e);
                }
                if let Some(output) = &job.output_ref {
                    if let Err(e) = self.artifacts.delete(output).await {
                        warn!("failed to delete output artifact of {}: {}", job.id, e);
                    }
                }
                Ok(true)
            }
            None => match self.store.get(job_id).await? {
                Some(job) => Err(anyhow!(
                    "job {} is {} and cannot be deleted yet",
                    job_id,
                    job.state
                )),
                None => Ok(false),
            },
        }
    }

    /// Fetch the translated document bytes of a completed job
    pub async fn fetch_output(&self, job_id: &str) -> Result<Bytes> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow!("unknown job: {}", job_id))?;
        let output = job
            .output_ref
            .ok_or_else(|| anyhow!("job {} has no output (state: {})", job_id, job.state))?;
        self.artifacts.get(&output).await
    }

    // =========================================================================
    // Worker side
    // =========================================================================

    /// Pull and process jobs until shutdown is signalled.
    ///
    /// Multiple workers may run concurrently against the same store and
    /// queue; the claim transition keeps them from double-processing.
    pub async fn run_worker(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("worker started");
        let poll = Duration::from_millis(self.config.job.poll_interval_ms);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.dequeue().await {
                Ok(Some(delivery)) => {
                    // Stage failures are converted into state transitions
                    // inside; only persistence-layer errors surface here.
                    if let Err(e) = self.process_delivery(&delivery).await {
                        error!("delivery {} failed: {}", delivery.delivery_id, e);
                        let _ = self.queue.nack(&delivery, poll).await;
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!("queue dequeue failed: {}", e);
                    tokio::time::sleep(poll).await;
                }
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Requeue expired leases until shutdown is signalled
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let interval = Duration::from_secs(self.config.job.sweep_interval_secs);
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.sweep_expired_leases().await {
                error!("lease sweep failed: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        Ok(())
    }

    /// One pass over expired leases: requeue crashed jobs, fail exhausted
    /// ones. Returns the number of leases handled.
    pub async fn sweep_expired_leases(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let expired = self.store.expired_processing(now).await?;
        let count = expired.len();

        for job in expired {
            if job.cancel_requested {
                if self
                    .store
                    .fail(&job.id, JobState::Processing, "cancelled: cancellation requested")
                    .await?
                {
                    self.emit(&job.id, JobState::Failed, Some("cancelled".to_string()));
                }
            } else if job.attempt_count >= job.max_attempts {
                let detail = format!(
                    "lease_expired: worker lease expired after {} attempts",
                    job.attempt_count
                );
                if self.store.fail(&job.id, JobState::Processing, &detail).await? {
                    warn!("job {} failed: {}", job.id, detail);
                    self.emit(&job.id, JobState::Failed, Some(detail));
                }
            } else if self.store.release(&job.id).await? {
                info!(
                    "job {} lease expired, requeueing (attempt {}/{})",
                    job.id, job.attempt_count, job.max_attempts
                );
                self.queue.enqueue(&job.id).await?;
                self.emit(&job.id, JobState::Pending, Some("lease_expired".to_string()));
            }
        }

        Ok(count)
    }

    /// Claim and run one delivered job
    async fn process_delivery(&self, delivery: &Delivery) -> Result<()> {
        let lease_ttl = self.config.job.lease_ttl_secs;

        match self.store.claim(&delivery.job_id, lease_ttl).await? {
            ClaimOutcome::NotFound => {
                warn!("dequeued unknown job {}", delivery.job_id);
                self.queue.ack(delivery).await
            }
            ClaimOutcome::NotPending(state) => {
                // A flagged pending job never passes the claim condition;
                // resolve the cancellation here.
                if state == JobState::Pending {
                    if let Some(job) = self.store.get(&delivery.job_id).await? {
                        if job.cancel_requested
                            && self
                                .store
                                .fail(
                                    &job.id,
                                    JobState::Pending,
                                    "cancelled: cancellation requested",
                                )
                                .await?
                        {
                            self.emit(&job.id, JobState::Failed, Some("cancelled".to_string()));
                        }
                    }
                } else {
                    debug!(
                        "job {} already {}, dropping delivery",
                        delivery.job_id, state
                    );
                }
                self.queue.ack(delivery).await
            }
            ClaimOutcome::Claimed(job) => {
                self.emit(&job.id, JobState::Processing, None);

                match self.run_pipeline(&job).await {
                    Ok(output_ref) => {
                        if self.store.complete(&job.id, &output_ref).await? {
                            info!("job {} completed", job.id);
                            self.emit(&job.id, JobState::Completed, None);
                        }
                    }
                    Err(err) => {
                        let detail = failure_detail(&err);
                        if matches!(
                            err,
                            AppError::Reassemble(_)
                                | AppError::Provider(ProviderError::MalformedResponse(_))
                        ) {
                            // Consistency errors are defects, not weather.
                            error!("job {} hit a contract violation: {}", job.id, detail);
                        } else {
                            warn!("job {} failed: {}", job.id, detail);
                        }
                        if self.store.fail(&job.id, JobState::Processing, &detail).await? {
                            self.emit(&job.id, JobState::Failed, Some(detail));
                        }
                    }
                }

                self.queue.ack(delivery).await
            }
        }
    }

    /// Run the pipeline stages for a claimed job
    async fn run_pipeline(&self, job: &Job) -> Result<ArtifactRef, AppError> {
        let input = self
            .artifacts
            .get(&job.input_ref)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let layout = LayoutExtractor::extract(&input)?;

        let backend = self
            .registry
            .get(job.provider)
            .ok_or_else(|| {
                AppError::Unknown(format!("no backend registered for provider '{}'", job.provider))
            })?;

        let limits = self
            .config
            .translation
            .provider_config(job.provider)
            .map(|p| p.batch_limits())
            .unwrap_or_default();

        let batches = UnitBatcher::new(limits).partition(&layout.units);
        debug!(
            "job {}: {} units in {} batches",
            job.id,
            layout.units.len(),
            batches.len()
        );

        let mut translated = Vec::with_capacity(layout.units.len());
        for batch in &batches {
            // Cancellation is cooperative: checked between batches, never
            // mid-request.
            if self
                .store
                .is_cancel_requested(&job.id)
                .await
                .map_err(|e| AppError::Persistence(e.to_string()))?
            {
                return Err(AppError::Cancelled);
            }

            if let Err(e) = self
                .store
                .heartbeat(&job.id, self.config.job.lease_ttl_secs)
                .await
            {
                debug!("heartbeat for job {} failed: {}", job.id, e);
            }

            let request = BatchRequest {
                texts: batch.units.iter().map(|u| u.source_text.clone()).collect(),
                source_lang: job.source_lang.clone(),
                target_lang: job.target_lang.clone(),
                model: job.model_ref.clone(),
                temperature: self.config.translation.temperature,
            };

            let texts = self.translate_with_retry(backend.as_ref(), &request).await?;
            translated.extend(
                batch
                    .units
                    .iter()
                    .zip(texts)
                    .map(|(unit, text)| unit.clone().with_translation(text)),
            );
        }

        let reassembler = Reassembler::new(self.config.layout.fit_policy());
        let output = reassembler.reassemble(&layout.document, &translated)?;

        let bytes = output
            .to_bytes()
            .map_err(|e| AppError::Unknown(e.to_string()))?;
        self.artifacts
            .put(Bytes::from(bytes))
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    /// Call the backend with the shared backoff policy.
    ///
    /// Transient errors are retried up to the configured attempt ceiling,
    /// honoring any retry-after hint; a malformed response gets exactly one
    /// extra attempt; auth rejection is never retried.
    async fn translate_with_retry(
        &self,
        backend: &dyn TranslationBackend,
        request: &BatchRequest,
    ) -> Result<Vec<String>, AppError> {
        let max_attempts = self.config.job.max_provider_attempts.max(1);
        let mut malformed_retry_used = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match backend.translate_batch(request).await {
                Ok(texts) => return Ok(texts),
                Err(err) => {
                    let malformed = matches!(err, ProviderError::MalformedResponse(_));
                    let exhausted = !err.is_retryable()
                        || attempt >= max_attempts
                        || (malformed && malformed_retry_used);
                    if exhausted {
                        return Err(AppError::Provider(err));
                    }
                    if malformed {
                        malformed_retry_used = true;
                    }

                    let delay = self.backoff_delay(attempt, err.retry_after());
                    warn!(
                        "provider call failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Exponential backoff with jitter, overridden by a retry-after hint
    fn backoff_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }
        let base = self.config.job.retry_backoff_ms.max(1);
        let exp = base.saturating_mul(1u64 << (attempt.min(16) - 1));
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis(exp + jitter)
    }

    /// Emit a progress event after its transition has been persisted
    fn emit(&self, job_id: &str, state: JobState, detail: Option<String>) {
        let _ = self
            .events
            .send(ProgressEvent::new(job_id, state, detail));
    }
}

/// Render a pipeline failure into the recorded error detail, prefixed with
/// its taxonomy label
fn failure_detail(err: &AppError) -> String {
    match err {
        AppError::Extract(e) => match e {
            crate::errors::ExtractError::UnsupportedFormat(_) => {
                format!("unsupported_format: {e}")
            }
            crate::errors::ExtractError::NoTranslatableContent => {
                format!("no_translatable_content: {e}")
            }
        },
        AppError::Provider(p) => format!("{}: {}", p.label(), p),
        AppError::Reassemble(e) => format!("reassembly_inconsistent: {e}"),
        AppError::Cancelled => "cancelled: cancellation requested".to_string(),
        AppError::Storage(e) => format!("storage: {e}"),
        AppError::Persistence(e) => format!("persistence: {e}"),
        AppError::Unknown(e) => format!("internal: {e}"),
    }
}
