//! Visitor number sequence allocation
//!
//! The counter lives in the database and is advanced with a single
//! UPDATE ... RETURNING statement, so concurrent callers can never observe
//! the same value. Application-level read-then-write is deliberately not
//! used: it loses updates under concurrency.

use async_trait::async_trait;
use funnel_common::db::VISITOR_NUMBER_COUNTER;
use funnel_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;

/// Issues strictly increasing positive integers to unbounded concurrent
/// callers. Gaps are acceptable after failures; duplicates never are.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Next value in the sequence. Fails with `Error::Allocation` when the
    /// underlying counter is unreachable or the call exceeds its timeout;
    /// callers proceed without a number rather than retrying in-request.
    async fn next(&self) -> Result<i64>;
}

/// Allocator backed by the `counters` table
pub struct SqliteAllocator {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteAllocator {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl SequenceAllocator for SqliteAllocator {
    async fn next(&self) -> Result<i64> {
        let increment = sqlx::query_scalar::<_, i64>(
            "UPDATE counters SET value = value + 1 WHERE name = ? RETURNING value",
        )
        .bind(VISITOR_NUMBER_COUNTER)
        .fetch_one(&self.pool);

        match tokio::time::timeout(self.timeout, increment).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(sqlx::Error::RowNotFound)) => Err(Error::Allocation(format!(
                "counter row '{}' missing",
                VISITOR_NUMBER_COUNTER
            ))),
            Ok(Err(e)) => Err(Error::Allocation(format!("counter increment failed: {}", e))),
            Err(_) => Err(Error::Allocation(format!(
                "counter increment timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = funnel_common::db::init_database(&dir.path().join("funnel.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn values_start_at_one_and_strictly_increase() {
        let (_dir, pool) = test_pool().await;
        let allocator = SqliteAllocator::new(pool, Duration::from_millis(750));

        let mut previous = 0;
        for expected in 1..=10 {
            let value = allocator.next().await.unwrap();
            assert_eq!(value, expected);
            assert!(value > previous);
            previous = value;
        }
    }

    #[tokio::test]
    async fn missing_counter_row_is_an_allocation_error() {
        let (_dir, pool) = test_pool().await;
        sqlx::query("DELETE FROM counters WHERE name = ?")
            .bind(VISITOR_NUMBER_COUNTER)
            .execute(&pool)
            .await
            .unwrap();

        let allocator = SqliteAllocator::new(pool, Duration::from_millis(750));
        match allocator.next().await {
            Err(Error::Allocation(_)) => {}
            other => panic!("expected Allocation error, got {:?}", other),
        }
    }
}
