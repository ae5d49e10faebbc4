/*!
 * Job records and progress events.
 *
 * These structures map directly to the jobs table and provide type-safe
 * access to persisted lifecycle state. The job record is the single source
 * of truth for a translation request; progress events are best-effort
 * notifications derived from it.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app_config::ProviderKind;
use crate::storage::ArtifactRef;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue for a worker
    Pending,
    /// Claimed by a worker, pipeline running
    Processing,
    /// Output artifact persisted
    Completed,
    /// Terminal failure, detail recorded on the record
    Failed,
}

impl JobState {
    /// Whether the state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// One end-to-end translation request with persisted lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier (UUID)
    pub id: String,
    /// Source language code
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Translation provider handling this job
    pub provider: ProviderKind,
    /// Model identifier passed to the provider
    pub model_ref: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Times a worker has claimed this job
    pub attempt_count: i64,
    /// Claim ceiling before the job fails for good
    pub max_attempts: i64,
    /// Input document artifact
    pub input_ref: ArtifactRef,
    /// Output document artifact, set on completion
    pub output_ref: Option<ArtifactRef>,
    /// Last failure, labeled with its taxonomy class
    pub error_detail: Option<String>,
    /// Cooperative cancellation flag
    pub cancel_requested: bool,
    /// Unix timestamp the current worker's lease expires, while processing
    pub lease_expires_at: Option<i64>,
    /// RFC3339 creation time
    pub created_at: String,
    /// RFC3339 last update time
    pub updated_at: String,
}

impl Job {
    /// Create a new pending job record
    pub fn new(
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        provider: ProviderKind,
        model_ref: impl Into<String>,
        input_ref: ArtifactRef,
        max_attempts: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            provider,
            model_ref: model_ref.into(),
            state: JobState::Pending,
            attempt_count: 0,
            max_attempts,
            input_ref,
            output_ref: None,
            error_detail: None,
            cancel_requested: false,
            lease_expires_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// State-change notification, emitted at most once per transition.
///
/// Fire-and-forget: losing an event never desynchronizes the authoritative
/// record, which stays queryable through `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job the transition belongs to
    pub job_id: String,
    /// State entered by the transition
    pub state: JobState,
    /// Short human-readable context, e.g. the failure label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// RFC3339 emission time
    pub timestamp: String,
}

impl ProgressEvent {
    /// Create an event for a transition on the given job
    pub fn new(job_id: impl Into<String>, state: JobState, detail: Option<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            detail,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
