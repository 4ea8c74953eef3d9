//! Database initialization
//!
//! Creates the SQLite database on first run and applies the schema with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements, so startup is safe
//! to repeat and no separate migration step is needed for a fresh install.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Counter name backing visitor number allocation
pub const VISITOR_NUMBER_COUNTER: &str = "visitor_number";

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    apply_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Connection pragmas: foreign keys, WAL for write concurrency under
/// concurrent session traffic, and a busy timeout so writers queue briefly
/// instead of failing immediately under contention.
pub async fn apply_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create all tables (idempotent, safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;
    create_responses_table(pool).await?;
    create_counters_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            display_name TEXT,
            email TEXT,
            visitor_number INTEGER UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            guid TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid),
            experiment_id TEXT NOT NULL,
            phase TEXT NOT NULL DEFAULT 'created',
            current_level INTEGER NOT NULL DEFAULT 1,
            branching_path TEXT NOT NULL DEFAULT 'default',
            is_completed INTEGER NOT NULL DEFAULT 0,
            visitor_number INTEGER,
            session_data TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_guid)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            guid TEXT PRIMARY KEY,
            session_guid TEXT NOT NULL REFERENCES sessions(guid),
            user_guid TEXT NOT NULL,
            level INTEGER NOT NULL,
            question_id TEXT NOT NULL,
            response_type TEXT NOT NULL,
            response_data TEXT NOT NULL,
            file_url TEXT,
            file_id TEXT,
            upload_status TEXT,
            scan_status TEXT,
            visitor_number INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_responses_session_level ON responses(session_guid, level)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Named monotonic counters. The visitor number counter is seeded at zero so
/// the first allocated number is 1; the single-statement increment in the
/// allocator is the only writer.
async fn create_counters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO counters (name, value) VALUES (?, 0)")
        .bind(VISITOR_NUMBER_COUNTER)
        .execute(pool)
        .await?;

    Ok(())
}
