/*!
 * Tests for the job store, the durable queue, and the artifact store
 */

use std::time::Duration;

use bytes::Bytes;

use doctrans::app_config::ProviderKind;
use doctrans::jobs::models::Job;
use doctrans::jobs::{ClaimOutcome, JobQueue, JobState, JobStore, SqliteQueue};
use doctrans::storage::{ArtifactRef, ArtifactStore, FsArtifactStore};

fn sample_job() -> Job {
    Job::new(
        "en",
        "ja",
        ProviderKind::Mock,
        "echo",
        ArtifactRef("deadbeef".to_string()),
        3,
    )
}

#[tokio::test]
async fn test_claim_withPendingJob_shouldTakeLeaseAndBumpAttempt() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();

    let outcome = store.claim(&job.id, 60).await.unwrap();

    let ClaimOutcome::Claimed(claimed) = outcome else {
        panic!("expected successful claim");
    };
    assert_eq!(claimed.state, JobState::Processing);
    assert_eq!(claimed.attempt_count, 1);
    assert!(claimed.lease_expires_at.is_some());
}

#[tokio::test]
async fn test_claim_withTwoRacingWorkers_shouldAdmitExactlyOne() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();

    let (first, second) =
        tokio::join!(store.claim(&job.id, 60), store.claim(&job.id, 60));

    let outcomes = [first.unwrap(), second.unwrap()];
    let wins = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
        .count();
    let losses = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::NotPending(JobState::Processing)))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(losses, 1);
}

#[tokio::test]
async fn test_claim_withUnknownJob_shouldReportNotFound() {
    let store = JobStore::new_in_memory().unwrap();
    let outcome = store.claim("no-such-job", 60).await.unwrap();
    assert!(matches!(outcome, ClaimOutcome::NotFound));
}

#[tokio::test]
async fn test_complete_fromProcessing_shouldRecordOutputOnce() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();
    store.claim(&job.id, 60).await.unwrap();

    let output = ArtifactRef("cafe".to_string());
    assert!(store.complete(&job.id, &output).await.unwrap());
    // The transition is conditional; a second attempt is a no-op.
    assert!(!store.complete(&job.id, &output).await.unwrap());

    let stored = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.output_ref, Some(output));
    assert!(stored.lease_expires_at.is_none());
}

#[tokio::test]
async fn test_fail_fromWrongState_shouldNotTransition() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();

    // Still pending, so a processing->failed transition must not apply.
    assert!(!store
        .fail(&job.id, JobState::Processing, "rate_limited: x")
        .await
        .unwrap());
    assert_eq!(
        store.get(&job.id).await.unwrap().unwrap().state,
        JobState::Pending
    );
}

#[tokio::test]
async fn test_expired_processing_shouldSurfaceOnlyExpiredLeases() {
    let store = JobStore::new_in_memory().unwrap();
    let expired = sample_job();
    let healthy = sample_job();
    store.insert(&expired).await.unwrap();
    store.insert(&healthy).await.unwrap();

    store.claim(&expired.id, -10).await.unwrap();
    store.claim(&healthy.id, 600).await.unwrap();

    let now = chrono::Utc::now().timestamp();
    let found = store.expired_processing(now).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, expired.id);
}

#[tokio::test]
async fn test_release_shouldReturnJobToPendingForReclaim() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();
    store.claim(&job.id, -10).await.unwrap();

    assert!(store.release(&job.id).await.unwrap());

    let outcome = store.claim(&job.id, 60).await.unwrap();
    let ClaimOutcome::Claimed(claimed) = outcome else {
        panic!("expected reclaim after release");
    };
    assert_eq!(claimed.attempt_count, 2);
}

#[tokio::test]
async fn test_request_cancel_shouldBlockFutureClaims() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();

    assert!(store.request_cancel(&job.id).await.unwrap());
    let outcome = store.claim(&job.id, 60).await.unwrap();
    assert!(matches!(outcome, ClaimOutcome::NotPending(JobState::Pending)));
}

#[tokio::test]
async fn test_delete_terminal_shouldOnlyRemoveTerminalJobs() {
    let store = JobStore::new_in_memory().unwrap();
    let job = sample_job();
    store.insert(&job).await.unwrap();

    assert!(store.delete_terminal(&job.id).await.unwrap().is_none());

    store.claim(&job.id, 60).await.unwrap();
    store
        .fail(&job.id, JobState::Processing, "auth_rejected: bad key")
        .await
        .unwrap();

    assert!(store.delete_terminal(&job.id).await.unwrap().is_some());
    assert!(store.get(&job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_queue_ackAndNack_shouldControlRedelivery() {
    let store = JobStore::new_in_memory().unwrap();
    let queue = SqliteQueue::new(store.database().clone());

    queue.enqueue("job-1").await.unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(first.job_id, "job-1");
    // In-flight: invisible to other consumers.
    assert!(queue.dequeue().await.unwrap().is_none());

    queue.nack(&first, Duration::ZERO).await.unwrap();
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(second.job_id, "job-1");

    queue.ack(&second).await.unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_queue_shouldDeliverInFifoOrder() {
    let store = JobStore::new_in_memory().unwrap();
    let queue = SqliteQueue::new(store.database().clone());

    queue.enqueue("job-a").await.unwrap();
    queue.enqueue("job-b").await.unwrap();

    assert_eq!(queue.dequeue().await.unwrap().unwrap().job_id, "job-a");
    assert_eq!(queue.dequeue().await.unwrap().unwrap().job_id, "job-b");
}

#[tokio::test]
async fn test_artifact_store_shouldRoundTripAndDeleteBytes() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = FsArtifactStore::new(dir.path()).unwrap();

    let payload = Bytes::from_static(b"paged document bytes");
    let reference = artifacts.put(payload.clone()).await.unwrap();

    // Content addressing: identical bytes yield the identical reference.
    let again = artifacts.put(payload.clone()).await.unwrap();
    assert_eq!(reference, again);

    assert_eq!(artifacts.get(&reference).await.unwrap(), payload);

    artifacts.delete(&reference).await.unwrap();
    assert!(artifacts.get(&reference).await.is_err());
}
