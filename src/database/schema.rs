/*!
 * Database schema definitions and migrations.
 *
 * This module contains the SQL schema for the job record and queue tables
 * and handles schema migrations for version upgrades.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    // WAL mode for concurrent readers and crash recovery
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    // Job records. `state` is only ever written through the conditional
    // transition in the job store; `lease_expires_at` is a unix timestamp
    // set while a worker holds the job.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            source_lang TEXT NOT NULL,
            target_lang TEXT NOT NULL,
            provider TEXT NOT NULL,
            model_ref TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            input_ref TEXT NOT NULL,
            output_ref TEXT,
            error_detail TEXT,
            cancel_requested INTEGER NOT NULL DEFAULT 0,
            lease_expires_at INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
        CREATE INDEX IF NOT EXISTS idx_jobs_lease ON jobs(state, lease_expires_at);
        "#,
    )?;

    // Durable queue. A row is in-flight while `claimed_by` is set; ack
    // deletes the row, nack clears the claim so the message redelivers.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS queue (
            delivery_id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            available_at INTEGER NOT NULL DEFAULT 0,
            claimed_by TEXT,
            enqueued_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_queue_available ON queue(claimed_by, available_at);
        "#,
    )?;

    Ok(())
}

/// Migrate the schema from an older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    // Single-version schema so far; recreate missing tables and stamp.
    let _ = from_version;
    create_all_tables(conn)?;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
