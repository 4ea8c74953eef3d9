//! Session database operations
//!
//! All mutations after insert go through the version-guarded update so
//! concurrent writers cannot lose updates on `current_level` or
//! `session_data`, even when both writes target the same phase.

use async_trait::async_trait;
use funnel_common::models::{Session, SessionPhase};
use funnel_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::store::{SessionStore, SessionUpdate};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let guid: String = row.get("guid");
    let user_guid: String = row.get("user_guid");
    let phase: String = row.get("phase");
    let session_data: String = row.get("session_data");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Session {
        guid: super::parse_uuid("session guid", &guid)?,
        user_guid: super::parse_uuid("user_guid", &user_guid)?,
        experiment_id: row.get("experiment_id"),
        phase: phase.parse::<SessionPhase>()?,
        current_level: row.get("current_level"),
        branching_path: row.get("branching_path"),
        is_completed: row.get::<i64, _>("is_completed") != 0,
        visitor_number: row.get("visitor_number"),
        session_data: serde_json::from_str(&session_data)
            .map_err(|e| Error::Internal(format!("Failed to parse session_data: {}", e)))?,
        version: row.get("version"),
        created_at: super::parse_timestamp("created_at", &created_at)?,
        updated_at: super::parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        let session_data = serde_json::to_string(&session.session_data)
            .map_err(|e| Error::Internal(format!("Failed to serialize session_data: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                guid, user_guid, experiment_id, phase, current_level,
                branching_path, is_completed, visitor_number, session_data,
                version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.guid.to_string())
        .bind(session.user_guid.to_string())
        .bind(&session.experiment_id)
        .bind(session.phase.as_str())
        .bind(session.current_level)
        .bind(&session.branching_path)
        .bind(session.is_completed as i64)
        .bind(session.visitor_number)
        .bind(&session_data)
        .bind(session.version)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, guid: Uuid) -> Result<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT guid, user_guid, experiment_id, phase, current_level,
                   branching_path, is_completed, visitor_number, session_data,
                   version, created_at, updated_at
            FROM sessions
            WHERE guid = ?
            "#,
        )
        .bind(guid.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_guarded(
        &self,
        guid: Uuid,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<bool> {
        let session_data = update
            .session_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to serialize session_data: {}", e)))?;

        // COALESCE keeps the stored blob when the update carries none. The
        // version check and bump are one statement, so a stale writer can
        // never overwrite a newer row.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET phase = ?,
                current_level = ?,
                branching_path = ?,
                is_completed = ?,
                session_data = COALESCE(?, session_data),
                version = version + 1,
                updated_at = ?
            WHERE guid = ? AND version = ?
            "#,
        )
        .bind(update.phase.as_str())
        .bind(update.current_level)
        .bind(&update.branching_path)
        .bind(update.is_completed as i64)
        .bind(session_data)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
