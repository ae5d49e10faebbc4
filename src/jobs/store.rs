/*!
 * Job record store.
 *
 * This module provides a high-level API for all job record operations,
 * abstracting away the SQL details and providing type-safe access. Every
 * state change goes through an atomic conditional update (`UPDATE ... WHERE
 * state = ?` with an affected-row check), which is what makes the claim and
 * the other transitions race-free across workers.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::DatabaseConnection;
use crate::jobs::models::{Job, JobState};
use crate::storage::ArtifactRef;

/// Outcome of a claim attempt
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This worker won the claim; the refreshed record is returned
    Claimed(Job),
    /// Another worker holds the job, or it is already terminal
    NotPending(JobState),
    /// No record with that id
    NotFound,
}

/// Repository for job records
#[derive(Clone)]
pub struct JobStore {
    /// Database connection
    db: DatabaseConnection,
}

/// Current unix timestamp in seconds
fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current RFC3339 timestamp
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl JobStore {
    /// Create a new store with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a store with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// The underlying database connection
    pub fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a job by id
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| Self::get_sync(conn, &job_id))
            .await
    }

    fn get_sync(conn: &Connection, job_id: &str) -> Result<Option<Job>> {
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_JOB),
                [job_id],
                parse_job_row,
            )
            .optional()?;
        Ok(result)
    }

    /// List jobs, newest first, optionally filtered by state
    pub async fn list(&self, state_filter: Option<JobState>) -> Result<Vec<Job>> {
        self.db
            .execute_async(move |conn| {
                let jobs = if let Some(state) = state_filter {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE state = ?1 ORDER BY created_at DESC",
                        SELECT_JOB
                    ))?;
                    let rows = stmt.query_map([state.to_string()], parse_job_row)?;
                    rows.filter_map(|r| r.ok()).collect()
                } else {
                    let mut stmt =
                        conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_JOB))?;
                    let rows = stmt.query_map([], parse_job_row)?;
                    rows.filter_map(|r| r.ok()).collect()
                };
                Ok(jobs)
            })
            .await
    }

    /// Whether cancellation has been requested for a job
    pub async fn is_cancel_requested(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                let flag: Option<bool> = conn
                    .query_row(
                        "SELECT cancel_requested FROM jobs WHERE id = ?1",
                        [job_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(flag.unwrap_or(false))
            })
            .await
    }

    /// Processing jobs whose lease expired before `now`
    pub async fn expired_processing(&self, now: i64) -> Result<Vec<Job>> {
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE state = 'processing' AND lease_expires_at IS NOT NULL AND lease_expires_at < ?1",
                    SELECT_JOB
                ))?;
                let rows = stmt.query_map([now], parse_job_row)?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            })
            .await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new job record
    pub async fn insert(&self, job: &Job) -> Result<()> {
        let job = job.clone();
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO jobs (
                        id, source_lang, target_lang, provider, model_ref, state,
                        attempt_count, max_attempts, input_ref, output_ref,
                        error_detail, cancel_requested, lease_expires_at,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    "#,
                    params![
                        job.id,
                        job.source_lang,
                        job.target_lang,
                        job.provider.to_string(),
                        job.model_ref,
                        job.state.to_string(),
                        job.attempt_count,
                        job.max_attempts,
                        job.input_ref.0,
                        job.output_ref.as_ref().map(|r| r.0.clone()),
                        job.error_detail,
                        job.cancel_requested,
                        job.lease_expires_at,
                        job.created_at,
                        job.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Atomically claim a pending job for processing.
    ///
    /// The conditional update is the whole concurrency story: of any number
    /// of workers racing on the same job, exactly one sees an affected row.
    /// The claim bumps the attempt count and takes a lease.
    pub async fn claim(&self, job_id: &str, lease_ttl_secs: i64) -> Result<ClaimOutcome> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                let affected = conn.execute(
                    r#"
                    UPDATE jobs
                    SET state = 'processing',
                        attempt_count = attempt_count + 1,
                        lease_expires_at = ?1,
                        updated_at = ?2
                    WHERE id = ?3 AND state = 'pending' AND cancel_requested = 0
                    "#,
                    params![now_epoch() + lease_ttl_secs, now_rfc3339(), job_id],
                )?;

                if affected == 1 {
                    let job = Self::get_sync(conn, &job_id)?
                        .ok_or_else(|| anyhow::anyhow!("claimed job {} vanished", job_id))?;
                    debug!("claimed job {} (attempt {})", job_id, job.attempt_count);
                    return Ok(ClaimOutcome::Claimed(job));
                }

                match Self::get_sync(conn, &job_id)? {
                    Some(job) => Ok(ClaimOutcome::NotPending(job.state)),
                    None => Ok(ClaimOutcome::NotFound),
                }
            })
            .await
    }

    /// Extend the lease of a job this worker is processing
    pub async fn heartbeat(&self, job_id: &str, lease_ttl_secs: i64) -> Result<()> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE jobs SET lease_expires_at = ?1, updated_at = ?2
                     WHERE id = ?3 AND state = 'processing'",
                    params![now_epoch() + lease_ttl_secs, now_rfc3339(), job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Transition `processing -> completed`, recording the output artifact
    pub async fn complete(&self, job_id: &str, output_ref: &ArtifactRef) -> Result<bool> {
        let job_id = job_id.to_string();
        let output = output_ref.0.clone();
        self.db
            .execute_async(move |conn| {
                let affected = conn.execute(
                    r#"
                    UPDATE jobs
                    SET state = 'completed', output_ref = ?1, error_detail = NULL,
                        lease_expires_at = NULL, updated_at = ?2
                    WHERE id = ?3 AND state = 'processing'
                    "#,
                    params![output, now_rfc3339(), job_id],
                )?;
                Ok(affected == 1)
            })
            .await
    }

    /// Transition to `failed` from the given state, recording the failure
    pub async fn fail(&self, job_id: &str, from: JobState, detail: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        let detail = detail.to_string();
        self.db
            .execute_async(move |conn| {
                let affected = conn.execute(
                    r#"
                    UPDATE jobs
                    SET state = 'failed', error_detail = ?1,
                        lease_expires_at = NULL, updated_at = ?2
                    WHERE id = ?3 AND state = ?4
                    "#,
                    params![detail, now_rfc3339(), job_id, from.to_string()],
                )?;
                Ok(affected == 1)
            })
            .await
    }

    /// Transition `processing -> pending`, releasing an expired lease so the
    /// job can be claimed again
    pub async fn release(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                let affected = conn.execute(
                    r#"
                    UPDATE jobs
                    SET state = 'pending', lease_expires_at = NULL, updated_at = ?1
                    WHERE id = ?2 AND state = 'processing'
                    "#,
                    params![now_rfc3339(), job_id],
                )?;
                Ok(affected == 1)
            })
            .await
    }

    /// Flag a pending or processing job for cooperative cancellation
    pub async fn request_cancel(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                let affected = conn.execute(
                    r#"
                    UPDATE jobs SET cancel_requested = 1, updated_at = ?1
                    WHERE id = ?2 AND state IN ('pending', 'processing')
                    "#,
                    params![now_rfc3339(), job_id],
                )?;
                Ok(affected == 1)
            })
            .await
    }

    /// Remove a terminal job record, returning it for artifact cleanup.
    ///
    /// Non-terminal jobs are left untouched.
    pub async fn delete_terminal(&self, job_id: &str) -> Result<Option<Job>> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                let job = Self::get_sync(conn, &job_id)?;
                match job {
                    Some(job) if job.state.is_terminal() => {
                        conn.execute(
                            "DELETE FROM jobs WHERE id = ?1 AND state IN ('completed', 'failed')",
                            [&job_id],
                        )?;
                        Ok(Some(job))
                    }
                    _ => Ok(None),
                }
            })
            .await
    }
}

/// Shared SELECT column list so every read parses identically
const SELECT_JOB: &str = r#"
    SELECT id, source_lang, target_lang, provider, model_ref, state,
           attempt_count, max_attempts, input_ref, output_ref,
           error_detail, cancel_requested, lease_expires_at,
           created_at, updated_at
    FROM jobs
"#;

/// Parse one row of the shared job SELECT
fn parse_job_row(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        source_lang: row.get(1)?,
        target_lang: row.get(2)?,
        provider: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(crate::app_config::ProviderKind::Ollama),
        model_ref: row.get(4)?,
        state: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or(JobState::Pending),
        attempt_count: row.get(6)?,
        max_attempts: row.get(7)?,
        input_ref: ArtifactRef(row.get(8)?),
        output_ref: row.get::<_, Option<String>>(9)?.map(ArtifactRef),
        error_detail: row.get(10)?,
        cancel_requested: row.get(11)?,
        lease_expires_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
