//! Session lifecycle controller
//!
//! Orchestrates session creation (visitor number acquisition), phase
//! transitions, response recording, and level completion. Every store and
//! collaborator arrives as an injected trait object; nothing here touches
//! SQL directly.
//!
//! Failure policy: numbering and file storage are secondary features.
//! Allocation failure degrades to a numberless session, storage failure
//! leaves the response row in failed state - neither ever blocks
//! participation or drops a recorded answer.

use funnel_common::models::{
    Answer, Response, ResponseType, Session, SessionPhase, UploadStatus, User,
};
use funnel_common::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

use crate::allocator::SequenceAllocator;
use crate::branching;
use crate::catalog::ExperimentCatalog;
use crate::storage::{CustomerProfile, FileStorage};
use crate::store::{ResponseStore, SessionStore, SessionUpdate, UserStore};

/// Payload of a submitted answer
#[derive(Debug, Clone)]
pub enum ResponsePayload {
    Text(String),
    File {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// Outcome of `record_response`. The response row is always durable by the
/// time this is returned; collaborator failures ride along as warnings so
/// the UI can offer a retry without re-submitting the answer.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub response: Response,
    pub storage_error: Option<String>,
    pub profile_error: Option<String>,
}

pub struct SessionLifecycle {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    responses: Arc<dyn ResponseStore>,
    allocator: Arc<dyn SequenceAllocator>,
    file_storage: Arc<dyn FileStorage>,
    customer_profile: Arc<dyn CustomerProfile>,
    catalog: Arc<ExperimentCatalog>,
    fallback_path: String,
}

impl SessionLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        responses: Arc<dyn ResponseStore>,
        allocator: Arc<dyn SequenceAllocator>,
        file_storage: Arc<dyn FileStorage>,
        customer_profile: Arc<dyn CustomerProfile>,
        catalog: Arc<ExperimentCatalog>,
        fallback_path: String,
    ) -> Self {
        Self {
            users,
            sessions,
            responses,
            allocator,
            file_storage,
            customer_profile,
            catalog,
            fallback_path,
        }
    }

    /// Create a session for an experiment, assigning a visitor number at
    /// most once per user. Allocation failure never blocks participation:
    /// the session is created with no number and the event is logged.
    pub async fn create_session(
        &self,
        experiment_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<Session> {
        if self.catalog.get(experiment_id).is_none() {
            return Err(Error::NotFound(format!(
                "Experiment not found: {}",
                experiment_id
            )));
        }

        // Resolve identity: existing user or a new anonymous one
        let mut user = match user_id {
            Some(id) => self
                .users
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))?,
            None => {
                let user = User::anonymous();
                self.users.insert(&user).await?;
                user
            }
        };

        if user.visitor_number.is_none() {
            user.visitor_number = self.assign_visitor_number(&user).await?;
        }

        let session = Session::new(experiment_id.to_string(), &user);
        self.sessions.insert(&session).await?;

        tracing::info!(
            session_id = %session.guid,
            user_id = %user.guid,
            experiment_id,
            visitor_number = ?session.visitor_number,
            "Session created"
        );

        Ok(session)
    }

    /// Allocate and claim a number for an un-numbered user. Returns None on
    /// degraded allocation; a lost claim race resolves to the winner's
    /// number.
    async fn assign_visitor_number(&self, user: &User) -> Result<Option<i64>> {
        let number = match self.allocator.next().await {
            Ok(n) => n,
            Err(Error::Allocation(reason)) => {
                tracing::warn!(
                    user_id = %user.guid,
                    reason = %reason,
                    "Visitor number allocation degraded; session proceeds without a number"
                );
                return Ok(None);
            }
            Err(other) => return Err(other),
        };

        if self.users.claim_visitor_number(user.guid, number).await? {
            return Ok(Some(number));
        }

        // A concurrent create numbered this user first; reuse theirs. The
        // allocated value stays unused - a gap, never a duplicate.
        let stored = self
            .users
            .get(user.guid)
            .await?
            .and_then(|u| u.visitor_number);
        tracing::debug!(
            user_id = %user.guid,
            discarded = number,
            reused = ?stored,
            "Lost visitor number claim race"
        );
        Ok(stored)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Session not found: {}", session_id)))
    }

    /// Validate and persist a phase transition, optionally replacing the
    /// session-data blob in the same atomic update.
    pub async fn advance_phase(
        &self,
        session_id: Uuid,
        target: SessionPhase,
        session_data: Option<serde_json::Value>,
    ) -> Result<Session> {
        loop {
            let session = self.get_session(session_id).await?;

            if !session.phase.can_transition_to(target) {
                return Err(Error::InvalidTransition {
                    from: session.phase,
                    to: target,
                });
            }

            let update = SessionUpdate {
                phase: target,
                current_level: session.current_level,
                branching_path: session.branching_path.clone(),
                is_completed: session.is_completed || target == SessionPhase::Complete,
                session_data: session_data.clone(),
            };

            if self
                .sessions
                .update_guarded(session_id, session.version, &update)
                .await?
            {
                tracing::debug!(
                    session_id = %session_id,
                    from = %session.phase,
                    to = %target,
                    "Phase advanced"
                );
                return self.get_session(session_id).await;
            }
            // Guard missed: another request updated the session between our
            // read and write. Reload and re-validate against the fresh row;
            // level and path are rebuilt from it on the next pass.
        }
    }

    /// Mark the session exited. Terminal; the row remains as a durable
    /// historical record.
    pub async fn exit_session(&self, session_id: Uuid) -> Result<Session> {
        self.advance_phase(session_id, SessionPhase::Exited, None)
            .await
    }

    /// Record one answer. The response row is written before any file bytes
    /// move (response-first, upload-second), so a slow or failing storage
    /// collaborator can delay a retrievable file but never lose the answer.
    pub async fn record_response(
        &self,
        session_id: Uuid,
        question_id: &str,
        response_type: ResponseType,
        payload: ResponsePayload,
    ) -> Result<RecordOutcome> {
        // A file-typed response must carry file bytes and a textual one must
        // carry text; a mismatch is a caller bug, not something to coerce.
        match (&payload, response_type.is_file()) {
            (ResponsePayload::Text(_), true) => {
                return Err(Error::InvalidInput(format!(
                    "Response type '{}' requires a file payload",
                    response_type.as_str()
                )));
            }
            (ResponsePayload::File { .. }, false) => {
                return Err(Error::InvalidInput(format!(
                    "Response type '{}' cannot carry a file payload",
                    response_type.as_str()
                )));
            }
            _ => {}
        }

        let session = self.get_session(session_id).await?;

        let response_data = match &payload {
            ResponsePayload::Text(text) => text.clone(),
            ResponsePayload::File { content_type, .. } => format!("file:{}", content_type),
        };

        let mut response = Response {
            guid: Uuid::new_v4(),
            session_guid: session.guid,
            user_guid: session.user_guid,
            level: session.current_level,
            question_id: question_id.to_string(),
            response_type,
            response_data,
            file_url: None,
            file_id: None,
            upload_status: response_type.is_file().then_some(UploadStatus::Pending),
            scan_status: None,
            // Immutable snapshot of the owning session's number. Null iff
            // the session has none; a later numbering correction must not
            // rewrite history.
            visitor_number: session.visitor_number,
            created_at: chrono::Utc::now(),
        };

        self.responses.insert(&response).await?;

        let mut storage_error = None;
        if let ResponsePayload::File { bytes, content_type } = &payload {
            match self
                .file_storage
                .store(bytes, content_type, session.guid, question_id)
                .await
            {
                Ok(stored) => {
                    self.responses
                        .settle_upload(
                            response.guid,
                            UploadStatus::Complete,
                            Some(&stored.url),
                            Some(&stored.id),
                        )
                        .await?;
                    response.upload_status = Some(UploadStatus::Complete);
                    response.file_url = Some(stored.url);
                    response.file_id = Some(stored.id);
                }
                Err(e) => {
                    // The answer row already persists; only the file is lost
                    self.responses
                        .settle_upload(response.guid, UploadStatus::Failed, None, None)
                        .await?;
                    response.upload_status = Some(UploadStatus::Failed);
                    tracing::warn!(
                        session_id = %session_id,
                        response_id = %response.guid,
                        error = %e,
                        "File upload failed; response kept in failed state"
                    );
                    storage_error = Some(e.to_string());
                }
            }
        }

        let profile_error = self.sync_profile(&session, &response).await;

        tracing::info!(
            session_id = %session_id,
            response_id = %response.guid,
            question_id,
            response_type = response_type.as_str(),
            visitor_number = ?response.visitor_number,
            "Response recorded"
        );

        Ok(RecordOutcome {
            response,
            storage_error,
            profile_error,
        })
    }

    /// Fire-and-forget profile upsert for email/name answers. Failure is
    /// reported to the caller but never blocks the session.
    async fn sync_profile(&self, session: &Session, response: &Response) -> Option<String> {
        let (email, name) = match response.response_type {
            ResponseType::Email => (Some(response.response_data.as_str()), None),
            ResponseType::Name => (None, Some(response.response_data.as_str())),
            _ => return None,
        };

        match self
            .customer_profile
            .upsert(email, name, session.guid)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.guid,
                    error = %e,
                    "Customer profile upsert failed"
                );
                Some(e.to_string())
            }
        }
    }

    /// Evaluate the current level's branching rules against the submitted
    /// answers, advance the level, and complete the session once the level
    /// count is exhausted.
    pub async fn complete_level(&self, session_id: Uuid, answers: &[Answer]) -> Result<Session> {
        loop {
            let session = self.get_session(session_id).await?;

            if session.phase.is_terminal() {
                return Err(Error::InvalidTransition {
                    from: session.phase,
                    to: SessionPhase::Complete,
                });
            }

            let experiment = self.catalog.get(&session.experiment_id).ok_or_else(|| {
                Error::NotFound(format!("Experiment not found: {}", session.experiment_id))
            })?;

            let rules = experiment.rules_for_level(session.current_level);
            let target_path = branching::evaluate(rules, answers, &self.fallback_path);

            let next_level = session.current_level + 1;
            let finished = next_level > experiment.total_levels;
            let update = SessionUpdate {
                phase: if finished {
                    SessionPhase::Complete
                } else {
                    // Next level starts at its video content
                    SessionPhase::Video
                },
                current_level: next_level,
                branching_path: target_path.clone(),
                is_completed: finished,
                session_data: None,
            };

            if self
                .sessions
                .update_guarded(session_id, session.version, &update)
                .await?
            {
                tracing::info!(
                    session_id = %session_id,
                    level = session.current_level,
                    next_level,
                    branching_path = %target_path,
                    completed = finished,
                    "Level completed"
                );
                return self.get_session(session_id).await;
            }
        }
    }

    /// Responses recorded against a session, in insertion order
    pub async fn list_responses(&self, session_id: Uuid) -> Result<Vec<Response>> {
        // Validate existence so a bad id is NotFound, not an empty list
        self.get_session(session_id).await?;
        self.responses.list_for_session(session_id).await
    }
}
