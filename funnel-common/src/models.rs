//! Domain models shared by the funnel services
//!
//! The session phase state machine lives here so that stores, the lifecycle
//! controller, and the API layer all validate transitions the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Phase a session is currently in.
///
/// Forward order: `created → video → questions → post_submission → complete`.
/// `exited` is terminal and reachable from any non-complete phase. The only
/// permitted backward transition is the explicit video replay action
/// (`questions`/`post_submission` → `video`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Session row persisted, nothing shown yet
    Created,
    /// Watching the level's video content
    Video,
    /// Answering the level's questions
    Questions,
    /// Post-submission content (thank-you, share prompts)
    PostSubmission,
    /// All levels finished
    Complete,
    /// Abandoned by the visitor; terminal
    Exited,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Created => "created",
            SessionPhase::Video => "video",
            SessionPhase::Questions => "questions",
            SessionPhase::PostSubmission => "post_submission",
            SessionPhase::Complete => "complete",
            SessionPhase::Exited => "exited",
        }
    }

    /// Terminal phases admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Exited)
    }

    /// Whether the state machine permits `self → target`
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;

        if self.is_terminal() {
            return false;
        }
        match target {
            // Exit is reachable from any non-terminal phase
            Exited => true,
            // Forward entry plus the explicit replay action
            Video => matches!(self, Created | Questions | PostSubmission),
            Questions => matches!(self, Video),
            PostSubmission => matches!(self, Questions),
            Complete => matches!(self, PostSubmission),
            Created => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionPhase {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(SessionPhase::Created),
            "video" => Ok(SessionPhase::Video),
            "questions" => Ok(SessionPhase::Questions),
            "post_submission" => Ok(SessionPhase::PostSubmission),
            "complete" => Ok(SessionPhase::Complete),
            "exited" => Ok(SessionPhase::Exited),
            other => Err(crate::Error::Internal(format!(
                "Unknown session phase: {}",
                other
            ))),
        }
    }
}

/// Kind of answer a response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Text,
    Audio,
    Photo,
    Video,
    Email,
    Name,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::Audio => "audio",
            ResponseType::Photo => "photo",
            ResponseType::Video => "video",
            ResponseType::Email => "email",
            ResponseType::Name => "name",
        }
    }

    /// File-backed types go through the external storage collaborator
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            ResponseType::Audio | ResponseType::Photo | ResponseType::Video
        )
    }
}

impl FromStr for ResponseType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ResponseType::Text),
            "audio" => Ok(ResponseType::Audio),
            "photo" => Ok(ResponseType::Photo),
            "video" => Ok(ResponseType::Video),
            "email" => Ok(ResponseType::Email),
            "name" => Ok(ResponseType::Name),
            other => Err(crate::Error::Internal(format!(
                "Unknown response type: {}",
                other
            ))),
        }
    }
}

/// Upload progress of a file-backed response.
///
/// `None` for textual types. `Pending` (row written, bytes not yet durable)
/// is valid but transient, and distinct from `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Complete,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Complete => "COMPLETE",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(UploadStatus::Pending),
            "COMPLETE" => Ok(UploadStatus::Complete),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(crate::Error::Internal(format!(
                "Unknown upload status: {}",
                other
            ))),
        }
    }
}

/// Visitor identity. `visitor_number` is assigned lazily on first session
/// and at most once; repeat sessions reuse it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub guid: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub visitor_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Materialize a new anonymous user
    pub fn anonymous() -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4(),
            display_name: None,
            email: None,
            visitor_number: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One visitor's traversal of an experiment. Created once, mutated on each
/// phase/level transition, never deleted (durable audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub guid: Uuid,
    pub user_guid: Uuid,
    pub experiment_id: String,
    pub phase: SessionPhase,
    pub current_level: i64,
    pub branching_path: String,
    pub is_completed: bool,
    /// Null when allocation was degraded at creation time
    pub visitor_number: Option<i64>,
    /// Opaque blob for ephemeral UI state (name/email collected mid-flow)
    pub session_data: serde_json::Value,
    /// Optimistic concurrency stamp, bumped on every update. Guards catch
    /// intervening writes even when those writes leave the phase unchanged.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(experiment_id: String, user: &User) -> Self {
        let now = Utc::now();
        Self {
            guid: Uuid::new_v4(),
            user_guid: user.guid,
            experiment_id,
            phase: SessionPhase::Created,
            current_level: 1,
            branching_path: "default".to_string(),
            is_completed: false,
            visitor_number: user.visitor_number,
            session_data: serde_json::Value::Object(Default::default()),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One submitted answer. Append-only; `visitor_number` is a snapshot of the
/// owning session's number at insert time, never a live join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub guid: Uuid,
    pub session_guid: Uuid,
    pub user_guid: Uuid,
    pub level: i64,
    pub question_id: String,
    pub response_type: ResponseType,
    /// Literal text for textual types, an opaque handle for file types
    pub response_data: String,
    pub file_url: Option<String>,
    pub file_id: Option<String>,
    pub upload_status: Option<UploadStatus>,
    pub scan_status: Option<String>,
    pub visitor_number: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One branching rule. Condition grammar: `"default"` (always matches) or
/// `"<question_id>:<expected_value>"` (exact string equality).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchingRule {
    pub condition: String,
    pub target_path: String,
}

/// A (question, value) pair from the visitor, as seen by rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: String,
}

/// Read-only experiment content supplied to the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub total_levels: i64,
    #[serde(default)]
    pub levels: Vec<ExperimentLevel>,
}

/// Branching rules for a single level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentLevel {
    pub level: i64,
    #[serde(default)]
    pub rules: Vec<BranchingRule>,
}

impl Experiment {
    /// Rule list for a level; empty when the level has none configured
    pub fn rules_for_level(&self, level: i64) -> &[BranchingRule] {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.rules.as_slice())
            .unwrap_or(&[])
    }
}
