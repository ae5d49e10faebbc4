/*!
 * Job lifecycle engine.
 *
 * - `models`: job records and progress events
 * - `store`: SQLite repository with atomic conditional transitions
 * - `queue`: durable at-least-once job queue
 * - `orchestrator`: state machine, worker loop, retry policy, lease sweep
 */

pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod store;

// Re-export main types
pub use models::{Job, JobState, ProgressEvent};
pub use orchestrator::{JobEvents, Orchestrator};
pub use queue::{Delivery, JobQueue, SqliteQueue};
pub use store::{ClaimOutcome, JobStore};
