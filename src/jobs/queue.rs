/*!
 * Durable job queue.
 *
 * The queue carries job ids only; the record store stays the source of
 * truth. Delivery is at-least-once: a dequeued message is invisible to
 * other consumers until it is acked (removed) or nacked (made available
 * again). Workers must therefore tolerate seeing a job id whose record has
 * already moved on, which the claim transition makes harmless.
 */

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, OptionalExtension};

use crate::database::DatabaseConnection;

/// One dequeued message
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue-assigned delivery tag
    pub delivery_id: i64,
    /// The job to process
    pub job_id: String,
}

/// Durable at-least-once queue of job ids
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job id to the queue
    async fn enqueue(&self, job_id: &str) -> Result<()>;

    /// Take the oldest available message, or `None` when the queue is empty.
    ///
    /// The message stays invisible to other consumers until acked or nacked.
    async fn dequeue(&self) -> Result<Option<Delivery>>;

    /// Remove a delivered message for good
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Return a delivered message to the queue after a delay
    async fn nack(&self, delivery: &Delivery, redeliver_after: Duration) -> Result<()>;
}

/// SQLite-backed queue sharing the job database
#[derive(Clone)]
pub struct SqliteQueue {
    db: DatabaseConnection,
    /// Consumer tag stamped on in-flight messages
    consumer: String,
}

impl SqliteQueue {
    /// Create a queue over the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            consumer: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Number of messages currently waiting (not in-flight)
    pub async fn depth(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM queue WHERE claimed_by IS NULL",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        let job_id = job_id.to_string();
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT INTO queue (job_id, available_at, enqueued_at) VALUES (?1, 0, ?2)",
                    params![job_id, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
    }

    async fn dequeue(&self) -> Result<Option<Delivery>> {
        let consumer = self.consumer.clone();
        self.db
            .execute_async(move |conn| {
                // Claim-by-update keeps concurrent consumers from taking the
                // same message; RETURNING gives us the claimed row in the
                // same statement.
                let now = chrono::Utc::now().timestamp();
                let delivery = conn
                    .query_row(
                        r#"
                        UPDATE queue SET claimed_by = ?1
                        WHERE delivery_id = (
                            SELECT delivery_id FROM queue
                            WHERE claimed_by IS NULL AND available_at <= ?2
                            ORDER BY delivery_id
                            LIMIT 1
                        )
                        RETURNING delivery_id, job_id
                        "#,
                        params![consumer, now],
                        |row| {
                            Ok(Delivery {
                                delivery_id: row.get(0)?,
                                job_id: row.get(1)?,
                            })
                        },
                    )
                    .optional()?;
                if let Some(d) = &delivery {
                    debug!("dequeued job {} (delivery {})", d.job_id, d.delivery_id);
                }
                Ok(delivery)
            })
            .await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let delivery_id = delivery.delivery_id;
        self.db
            .execute_async(move |conn| {
                conn.execute("DELETE FROM queue WHERE delivery_id = ?1", [delivery_id])?;
                Ok(())
            })
            .await
    }

    async fn nack(&self, delivery: &Delivery, redeliver_after: Duration) -> Result<()> {
        let delivery_id = delivery.delivery_id;
        let available_at = chrono::Utc::now().timestamp() + redeliver_after.as_secs() as i64;
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE queue SET claimed_by = NULL, available_at = ?1 WHERE delivery_id = ?2",
                    params![available_at, delivery_id],
                )?;
                Ok(())
            })
            .await
    }
}
