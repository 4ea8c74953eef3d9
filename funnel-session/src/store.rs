//! Repository traits for the lifecycle controller
//!
//! The controller owns sessions exclusively and reaches every store through
//! these traits, so SQLite implementations and in-memory test doubles are
//! interchangeable.

use async_trait::async_trait;
use funnel_common::models::{Response, Session, SessionPhase, UploadStatus, User};
use funnel_common::Result;
use uuid::Uuid;

/// Durable user identities with their at-most-once visitor numbers
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;

    async fn get(&self, guid: Uuid) -> Result<Option<User>>;

    /// Assign `number` to the user only if no number is set yet (guarded
    /// single-statement update). Returns true iff this call performed the
    /// assignment; false means a concurrent caller already numbered the
    /// user and the stored number must be reused.
    async fn claim_visitor_number(&self, guid: Uuid, number: i64) -> Result<bool>;
}

/// Fields a session transition writes in one atomic step
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub phase: SessionPhase,
    pub current_level: i64,
    pub branching_path: String,
    pub is_completed: bool,
    /// None leaves the stored blob untouched
    pub session_data: Option<serde_json::Value>,
}

/// Durable session records. Sessions are never deleted.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<()>;

    async fn get(&self, guid: Uuid) -> Result<Option<Session>>;

    /// Apply `update` only while the row still carries `expected_version`,
    /// bumping the version in the same statement. The version guard catches
    /// every intervening write, including ones that leave the phase
    /// unchanged (a level bump re-entering `video`, for example). Returns
    /// false when a racing writer got there first; the caller reloads and
    /// re-validates instead of losing the update.
    async fn update_guarded(
        &self,
        guid: Uuid,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<bool>;
}

/// Append-only response records
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn insert(&self, response: &Response) -> Result<()>;

    /// Settle the upload outcome of a file-backed response. The only
    /// mutation a response ever sees.
    async fn settle_upload(
        &self,
        guid: Uuid,
        status: UploadStatus,
        file_url: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<()>;

    async fn list_for_session(&self, session_guid: Uuid) -> Result<Vec<Response>>;
}
