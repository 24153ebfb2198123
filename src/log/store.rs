//! Storage backend trait for the audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry::LogQuery;
use super::level::LogLevel;
use crate::error::RelayError;

/// One stored row. `context` is the serialized envelope, searched as plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub context: String,
}

/// Persistence backend for log rows.
///
/// Every method is a single atomic operation; implementations must tolerate concurrent
/// callers. Ids are assigned by the store and increase monotonically.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert a row and return its id.
    async fn insert(
        &self,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: &str,
        source: &str,
        context: &str,
    ) -> Result<i64, RelayError>;

    /// Filtered rows, newest first by id, after applying offset and limit.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRow>, RelayError>;

    /// Number of rows matching the query's filter. Pagination is ignored.
    async fn count(&self, query: &LogQuery) -> Result<u64, RelayError>;

    /// Rows for the given ids, one per distinct id. Unknown ids produce no row.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<LogRow>, RelayError>;

    /// Replace level, message and context. Returns false when the id does not exist.
    async fn update(
        &self,
        id: i64,
        level: LogLevel,
        message: &str,
        context: &str,
    ) -> Result<bool, RelayError>;

    /// Returns the number of rows removed.
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, RelayError>;

    async fn delete_by_source(&self, source: &str) -> Result<u64, RelayError>;

    async fn truncate(&self) -> Result<u64, RelayError>;

    /// Remove rows with a timestamp strictly before `cutoff`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RelayError>;
}
