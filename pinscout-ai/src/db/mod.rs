//! Database access for pinscout-ai
//!
//! Free functions over an explicit `&SqlitePool`, one module per table
//! group. UUIDs and timestamps are stored as TEXT; statuses as their
//! lower-case names.

pub mod items;
pub mod prompts;
pub mod stages;

use chrono::{DateTime, SecondsFormat, Utc};
use pinscout_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Open (creating if missing) the database file and ensure the schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database, used by tests
///
/// The connection is never recycled, otherwise the in-memory database
/// would vanish with it.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prompts (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_records (
            id TEXT PRIMARY KEY,
            prompt_id TEXT NOT NULL,
            run_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_log_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            stage_record_id TEXT NOT NULL
                REFERENCES stage_records(id) ON DELETE CASCADE,
            logged_at TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            prompt_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            source_ref TEXT NOT NULL DEFAULT '',
            image_ref TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            score REAL NOT NULL DEFAULT 0.0,
            status TEXT NOT NULL DEFAULT 'pending',
            explanation TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_prompts_created_at ON prompts(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_stage_records_prompt ON stage_records(prompt_id, stage, timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_stage_log_entries_record ON stage_log_entries(stage_record_id, seq)",
        "CREATE INDEX IF NOT EXISTS idx_items_prompt_status ON items(prompt_id, status)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (prompts, stage_records, stage_log_entries, items)");

    Ok(())
}

/// Timestamp in the stored form; fixed width so TEXT ordering is chronological
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", raw, e)))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid stored UUID '{}': {}", raw, e)))
}

/// Parse a stored status/stage name, rejecting unknown values
pub(crate) fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(Error::Internal)
}
