//! HTTP API handlers

pub mod health;
pub mod sessions;

pub use health::health_routes;
pub use sessions::session_routes;
