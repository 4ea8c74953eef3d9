//! SQLite implementations of the repository traits

pub mod responses;
pub mod sessions;
pub mod users;

pub use responses::SqliteResponseStore;
pub use sessions::SqliteSessionStore;
pub use users::SqliteUserStore;

use chrono::{DateTime, Utc};
use funnel_common::{Error, Result};

/// Parse an RFC 3339 text column
pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

/// Parse a TEXT uuid column
pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}
