//! Response database operations
//!
//! Responses are append-only. The denormalized `visitor_number` column is a
//! snapshot taken by the lifecycle controller at insert time; nothing here
//! ever re-reads it from the session.

use async_trait::async_trait;
use funnel_common::models::{Response, ResponseType, UploadStatus};
use funnel_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::store::ResponseStore;

pub struct SqliteResponseStore {
    pool: SqlitePool,
}

impl SqliteResponseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_response(row: &sqlx::sqlite::SqliteRow) -> Result<Response> {
    let guid: String = row.get("guid");
    let session_guid: String = row.get("session_guid");
    let user_guid: String = row.get("user_guid");
    let response_type: String = row.get("response_type");
    let upload_status: Option<String> = row.get("upload_status");
    let created_at: String = row.get("created_at");

    Ok(Response {
        guid: super::parse_uuid("response guid", &guid)?,
        session_guid: super::parse_uuid("session_guid", &session_guid)?,
        user_guid: super::parse_uuid("user_guid", &user_guid)?,
        level: row.get("level"),
        question_id: row.get("question_id"),
        response_type: response_type.parse::<ResponseType>()?,
        response_data: row.get("response_data"),
        file_url: row.get("file_url"),
        file_id: row.get("file_id"),
        upload_status: upload_status
            .map(|s| s.parse::<UploadStatus>())
            .transpose()?,
        scan_status: row.get("scan_status"),
        visitor_number: row.get("visitor_number"),
        created_at: super::parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ResponseStore for SqliteResponseStore {
    async fn insert(&self, response: &Response) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (
                guid, session_guid, user_guid, level, question_id,
                response_type, response_data, file_url, file_id,
                upload_status, scan_status, visitor_number, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(response.guid.to_string())
        .bind(response.session_guid.to_string())
        .bind(response.user_guid.to_string())
        .bind(response.level)
        .bind(&response.question_id)
        .bind(response.response_type.as_str())
        .bind(&response.response_data)
        .bind(&response.file_url)
        .bind(&response.file_id)
        .bind(response.upload_status.map(|s| s.as_str()))
        .bind(&response.scan_status)
        .bind(response.visitor_number)
        .bind(response.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn settle_upload(
        &self,
        guid: Uuid,
        status: UploadStatus,
        file_url: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE responses
            SET upload_status = ?, file_url = ?, file_id = ?
            WHERE guid = ?
            "#,
        )
        .bind(status.as_str())
        .bind(file_url)
        .bind(file_id)
        .bind(guid.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_session(&self, session_guid: Uuid) -> Result<Vec<Response>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, session_guid, user_guid, level, question_id,
                   response_type, response_data, file_url, file_id,
                   upload_status, scan_status, visitor_number, created_at
            FROM responses
            WHERE session_guid = ?
            ORDER BY created_at, guid
            "#,
        )
        .bind(session_guid.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_response).collect()
    }
}
