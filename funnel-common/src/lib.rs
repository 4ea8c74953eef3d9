//! # Funnel Common Library
//!
//! Shared code for the participation-funnel services including:
//! - Error taxonomy
//! - Configuration and root folder resolution
//! - Database schema and pool initialization
//! - Domain models (users, sessions, responses, branching rules)

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
