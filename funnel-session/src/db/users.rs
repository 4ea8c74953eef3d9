//! User database operations

use async_trait::async_trait;
use funnel_common::models::User;
use funnel_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::store::UserStore;

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (guid, display_name, email, visitor_number, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.guid.to_string())
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.visitor_number)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, guid: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT guid, display_name, email, visitor_number, created_at, updated_at
            FROM users
            WHERE guid = ?
            "#,
        )
        .bind(guid.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let guid_str: String = row.get("guid");
                let created_at: String = row.get("created_at");
                let updated_at: String = row.get("updated_at");

                Ok(Some(User {
                    guid: super::parse_uuid("user guid", &guid_str)?,
                    display_name: row.get("display_name"),
                    email: row.get("email"),
                    visitor_number: row.get("visitor_number"),
                    created_at: super::parse_timestamp("created_at", &created_at)?,
                    updated_at: super::parse_timestamp("updated_at", &updated_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn claim_visitor_number(&self, guid: Uuid, number: i64) -> Result<bool> {
        // Guarded single statement: only an un-numbered user accepts the
        // assignment, so a user can never be numbered twice.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET visitor_number = ?, updated_at = ?
            WHERE guid = ? AND visitor_number IS NULL
            "#,
        )
        .bind(number)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
