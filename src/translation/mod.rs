/*!
 * Translation unit batching.
 *
 * - `batch`: greedy, group-aware partitioning of the unit sequence into
 *   provider-sized requests
 */

pub use self::batch::{Batch, BatchLimits, UnitBatcher};

pub mod batch;
