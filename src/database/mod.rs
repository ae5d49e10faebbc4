/*!
 * Database module for persistent job and queue state.
 *
 * This module provides SQLite-based persistence for:
 * - Job records with atomic conditional state transitions
 * - The durable at-least-once job queue
 */

pub mod connection;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
