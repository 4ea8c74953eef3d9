//! Common error types for the funnel services

use crate::models::SessionPhase;
use thiserror::Error;

/// Common result type for funnel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the funnel services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested session/user/level not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Phase transition not permitted by the session state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
    },

    /// Visitor number allocation failed (counter unreachable or timed out).
    /// Recovered locally: the session proceeds without a number.
    #[error("Visitor number allocation failed: {0}")]
    Allocation(String),

    /// External file storage collaborator failed. The response row persists
    /// in pending/failed state; the textual answer is never rolled back.
    #[error("File storage error: {0}")]
    Storage(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
