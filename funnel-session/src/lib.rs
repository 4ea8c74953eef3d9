//! funnel-session library interface
//!
//! Exposes the session lifecycle core and HTTP API for integration testing.

pub mod allocator;
pub mod api;
pub mod branching;
pub mod catalog;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod storage;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::lifecycle::SessionLifecycle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle controller (stores, allocator, collaborators)
    pub lifecycle: Arc<SessionLifecycle>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self {
            lifecycle,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
