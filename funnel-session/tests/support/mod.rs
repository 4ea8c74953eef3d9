//! Shared test fixtures: a tempdir-backed SQLite environment, in-memory
//! store fakes, and failing collaborator doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use funnel_common::models::{
    BranchingRule, Experiment, ExperimentLevel, Response, Session, UploadStatus, User,
};
use funnel_common::{Error, Result};
use funnel_session::allocator::{SequenceAllocator, SqliteAllocator};
use funnel_session::catalog::ExperimentCatalog;
use funnel_session::db::{SqliteResponseStore, SqliteSessionStore, SqliteUserStore};
use funnel_session::lifecycle::SessionLifecycle;
use funnel_session::storage::{CustomerProfile, FileStorage, LocalFileStorage, StoredFile};
use funnel_session::store::{ResponseStore, SessionStore, SessionUpdate, UserStore};

pub const EXPERIMENT_ID: &str = "exp-1";
pub const TOTAL_LEVELS: i64 = 5;

fn rule(condition: &str, target: &str) -> BranchingRule {
    BranchingRule {
        condition: condition.to_string(),
        target_path: target.to_string(),
    }
}

/// Five-level experiment; level 1 branches on q1, every level falls back to
/// a "default" rule.
pub fn test_catalog() -> Arc<ExperimentCatalog> {
    let levels = (1..=TOTAL_LEVELS)
        .map(|level| ExperimentLevel {
            level,
            rules: if level == 1 {
                vec![rule("q1:yes", "pathA"), rule("default", "default")]
            } else {
                vec![rule("default", "default")]
            },
        })
        .collect();

    Arc::new(ExperimentCatalog::new(vec![Experiment {
        id: EXPERIMENT_ID.to_string(),
        name: "test experiment".to_string(),
        total_levels: TOTAL_LEVELS,
        levels,
    }]))
}

pub struct TestEnv {
    pub _dir: TempDir,
    pub pool: sqlx::SqlitePool,
    pub lifecycle: Arc<SessionLifecycle>,
}

/// SQLite-backed lifecycle with the real allocator and local file storage
pub async fn sqlite_env() -> TestEnv {
    sqlite_env_with(None, None, None).await
}

/// SQLite-backed lifecycle with selected collaborators replaced by doubles
pub async fn sqlite_env_with(
    allocator: Option<Arc<dyn SequenceAllocator>>,
    storage: Option<Arc<dyn FileStorage>>,
    profile: Option<Arc<dyn CustomerProfile>>,
) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let pool = funnel_common::db::init_database(&dir.path().join("funnel.db"))
        .await
        .unwrap();

    let allocator = allocator.unwrap_or_else(|| {
        Arc::new(SqliteAllocator::new(
            pool.clone(),
            std::time::Duration::from_millis(750),
        ))
    });
    let storage = storage
        .unwrap_or_else(|| Arc::new(LocalFileStorage::new(dir.path().join("uploads"))));
    let profile = profile.unwrap_or_else(|| Arc::new(RecordingProfile::default()));

    let lifecycle = SessionLifecycle::new(
        Arc::new(SqliteUserStore::new(pool.clone())),
        Arc::new(SqliteSessionStore::new(pool.clone())),
        Arc::new(SqliteResponseStore::new(pool.clone())),
        allocator,
        storage,
        profile,
        test_catalog(),
        "default".to_string(),
    );

    TestEnv {
        _dir: dir,
        pool,
        lifecycle: Arc::new(lifecycle),
    }
}

/// SQLite-backed lifecycle whose session store sits behind a [`GatedSessionStore`],
/// for tests that need a deterministic interleaving of two writers.
pub async fn sqlite_env_gated() -> (TestEnv, Arc<GatedSessionStore>) {
    let dir = TempDir::new().unwrap();
    let pool = funnel_common::db::init_database(&dir.path().join("funnel.db"))
        .await
        .unwrap();

    let sessions = Arc::new(GatedSessionStore::new(Arc::new(SqliteSessionStore::new(
        pool.clone(),
    ))));

    let lifecycle = SessionLifecycle::new(
        Arc::new(SqliteUserStore::new(pool.clone())),
        sessions.clone(),
        Arc::new(SqliteResponseStore::new(pool.clone())),
        Arc::new(SqliteAllocator::new(
            pool.clone(),
            std::time::Duration::from_millis(750),
        )),
        Arc::new(LocalFileStorage::new(dir.path().join("uploads"))),
        Arc::new(RecordingProfile::default()),
        test_catalog(),
        "default".to_string(),
    );

    (
        TestEnv {
            _dir: dir,
            pool,
            lifecycle: Arc::new(lifecycle),
        },
        sessions,
    )
}

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

/// Session store wrapper with a one-shot gate on `update_guarded`. While
/// armed, the next guarded write signals `reached` and then parks until
/// `release` fires, letting a test slot a competing writer between another
/// caller's read and its write.
pub struct GatedSessionStore {
    inner: Arc<dyn SessionStore>,
    gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl GatedSessionStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    pub async fn arm(&self, reached: oneshot::Sender<()>, release: oneshot::Receiver<()>) {
        *self.gate.lock().await = Some((reached, release));
    }
}

#[async_trait]
impl SessionStore for GatedSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        self.inner.insert(session).await
    }

    async fn get(&self, guid: Uuid) -> Result<Option<Session>> {
        self.inner.get(guid).await
    }

    async fn update_guarded(
        &self,
        guid: Uuid,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<bool> {
        let armed = self.gate.lock().await.take();
        if let Some((reached, release)) = armed {
            let _ = reached.send(());
            let _ = release.await;
        }
        self.inner.update_guarded(guid, expected_version, update).await
    }
}

/// Allocator that always fails, simulating an unreachable counter
pub struct FailingAllocator;

#[async_trait]
impl SequenceAllocator for FailingAllocator {
    async fn next(&self) -> Result<i64> {
        Err(Error::Allocation("simulated counter outage".to_string()))
    }
}

/// File storage that always fails
pub struct FailingStorage;

#[async_trait]
impl FileStorage for FailingStorage {
    async fn store(
        &self,
        _bytes: &[u8],
        _content_type: &str,
        _session_id: Uuid,
        _question_id: &str,
    ) -> Result<StoredFile> {
        Err(Error::Storage("simulated storage outage".to_string()))
    }
}

/// Profile collaborator that records every upsert
#[derive(Default)]
pub struct RecordingProfile {
    pub calls: Mutex<Vec<(Option<String>, Option<String>, Uuid)>>,
}

#[async_trait]
impl CustomerProfile for RecordingProfile {
    async fn upsert(&self, email: Option<&str>, name: Option<&str>, session_id: Uuid) -> Result<()> {
        self.calls.lock().await.push((
            email.map(str::to_string),
            name.map(str::to_string),
            session_id,
        ));
        Ok(())
    }
}

/// Profile collaborator that always fails
pub struct FailingProfile;

#[async_trait]
impl CustomerProfile for FailingProfile {
    async fn upsert(&self, _email: Option<&str>, _name: Option<&str>, _session_id: Uuid) -> Result<()> {
        Err(Error::Internal("simulated CRM outage".to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory store fakes (no database at all)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        self.users.lock().await.insert(user.guid, user.clone());
        Ok(())
    }

    async fn get(&self, guid: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(&guid).cloned())
    }

    async fn claim_visitor_number(&self, guid: Uuid, number: i64) -> Result<bool> {
        let mut users = self.users.lock().await;
        match users.get_mut(&guid) {
            Some(user) if user.visitor_number.is_none() => {
                user.visitor_number = Some(number);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(session.guid, session.clone());
        Ok(())
    }

    async fn get(&self, guid: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.lock().await.get(&guid).cloned())
    }

    async fn update_guarded(
        &self,
        guid: Uuid,
        expected_version: i64,
        update: &SessionUpdate,
    ) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&guid) {
            Some(session) if session.version == expected_version => {
                session.phase = update.phase;
                session.current_level = update.current_level;
                session.branching_path = update.branching_path.clone();
                session.is_completed = update.is_completed;
                if let Some(data) = &update.session_data {
                    session.session_data = data.clone();
                }
                session.version += 1;
                session.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryResponseStore {
    responses: Mutex<Vec<Response>>,
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    async fn insert(&self, response: &Response) -> Result<()> {
        self.responses.lock().await.push(response.clone());
        Ok(())
    }

    async fn settle_upload(
        &self,
        guid: Uuid,
        status: UploadStatus,
        file_url: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<()> {
        let mut responses = self.responses.lock().await;
        if let Some(response) = responses.iter_mut().find(|r| r.guid == guid) {
            response.upload_status = Some(status);
            response.file_url = file_url.map(str::to_string);
            response.file_id = file_id.map(str::to_string);
        }
        Ok(())
    }

    async fn list_for_session(&self, session_guid: Uuid) -> Result<Vec<Response>> {
        Ok(self
            .responses
            .lock()
            .await
            .iter()
            .filter(|r| r.session_guid == session_guid)
            .cloned()
            .collect())
    }
}

/// In-memory counter allocator for the no-database lifecycle tests
#[derive(Default)]
pub struct MemoryAllocator {
    next: std::sync::atomic::AtomicI64,
}

#[async_trait]
impl SequenceAllocator for MemoryAllocator {
    async fn next(&self) -> Result<i64> {
        Ok(self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1)
    }
}

/// Lifecycle wired entirely from in-memory fakes, proving the controller
/// depends only on the repository traits
pub fn memory_lifecycle() -> Arc<SessionLifecycle> {
    Arc::new(SessionLifecycle::new(
        Arc::new(MemoryUserStore::default()),
        Arc::new(MemorySessionStore::default()),
        Arc::new(MemoryResponseStore::default()),
        Arc::new(MemoryAllocator::default()),
        Arc::new(FailingStorage),
        Arc::new(RecordingProfile::default()),
        test_catalog(),
        "default".to_string(),
    ))
}
