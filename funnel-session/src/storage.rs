//! External collaborator interfaces
//!
//! The core hands file bytes and profile upserts to these narrow traits;
//! provider internals (Drive, Firebase, CRM) are out of scope. Failures are
//! never allowed to take a recorded answer with them.

use async_trait::async_trait;
use funnel_common::{Error, Result};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable location of a stored file
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub url: String,
    pub id: String,
}

/// File storage collaborator. Failure is `Error::Storage`; the caller treats
/// it as "upload pending/failed", not fatal.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        session_id: Uuid,
        question_id: &str,
    ) -> Result<StoredFile>;
}

/// Customer profile collaborator. Fire-and-forget from the core's
/// perspective: failure is reported to the caller but never blocks the
/// session.
#[async_trait]
pub trait CustomerProfile: Send + Sync {
    async fn upsert(
        &self,
        email: Option<&str>,
        name: Option<&str>,
        session_id: Uuid,
    ) -> Result<()>;
}

/// Default collaborator: writes uploads under the root folder
pub struct LocalFileStorage {
    uploads_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self { uploads_dir }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        session_id: Uuid,
        question_id: &str,
    ) -> Result<StoredFile> {
        let file_id = Uuid::new_v4().to_string();
        let file_name = format!("{}-{}.{}", question_id, file_id, extension_for(content_type));
        let session_dir = self.uploads_dir.join(session_id.to_string());
        let path = session_dir.join(&file_name);

        tokio::fs::create_dir_all(&session_dir)
            .await
            .map_err(|e| Error::Storage(format!("create {}: {}", session_dir.display(), e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {}", path.display(), e)))?;

        tracing::debug!(
            session_id = %session_id,
            question_id,
            bytes = bytes.len(),
            path = %path.display(),
            "Stored uploaded file"
        );

        Ok(StoredFile {
            url: format!("file://{}", path.display()),
            id: file_id,
        })
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

/// Default profile collaborator: records the upsert in the log only
pub struct LoggingCustomerProfile;

#[async_trait]
impl CustomerProfile for LoggingCustomerProfile {
    async fn upsert(
        &self,
        email: Option<&str>,
        name: Option<&str>,
        session_id: Uuid,
    ) -> Result<()> {
        tracing::info!(
            session_id = %session_id,
            email = email.unwrap_or("-"),
            name = name.unwrap_or("-"),
            "Customer profile upsert"
        );
        Ok(())
    }
}
