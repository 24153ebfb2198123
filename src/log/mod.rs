//! Audit log of delivery attempts.
//!
//! [`AuditLog`] is the front the pipeline and callers use. It resolves sources, encodes
//! contexts into their versioned envelope and normalizes timestamps, then hands rows to a
//! [`LogStore`] backend:
//!
//! | Store | Feature | Notes |
//! |-------|---------|-------|
//! | [`MemoryLogStore`] | (none) | Process lifetime only |
//! | [`SqliteLogStore`] | `sqlite` | `email_log` table via sqlx |
//!
//! ```
//! # tokio_test_block(async {
//! use mailroute::log::{AuditLog, LogFilter, LogLevel, LogQuery};
//! use serde_json::json;
//!
//! let log = AuditLog::memory();
//! let id = log
//!     .insert(chrono::Utc::now(), "error", "bounce", Some("webhook"), json!({"to": "a@example.com"}))
//!     .await?;
//!
//! let errors = log.query(&LogQuery::new(LogFilter::new().level(LogLevel::Error))).await?;
//! assert_eq!(errors[0].id, id);
//! # Ok::<(), mailroute::RelayError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod context;
mod entry;
mod level;
mod memory;
mod source;
mod store;

#[cfg(feature = "sqlite")]
mod sqlite;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use context::{AttachmentRecord, EmailLogContext, Recipients};
pub use entry::{DateRange, LogEntry, LogFilter, LogQuery, LogUpdate, NewLogEntry};
pub use level::LogLevel;
pub use memory::MemoryLogStore;
pub use source::{CallerLocation, RequireExplicit, SourceResolver};
pub use store::{LogRow, LogStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLogStore;

use crate::error::RelayError;
use entry::normalize_timestamp;

/// Front for reading and writing log entries.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn LogStore>,
    resolver: Arc<dyn SourceResolver>,
}

impl AuditLog {
    /// Entries without an explicit source are rejected until a resolver is set.
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            resolver: Arc::new(RequireExplicit),
        }
    }

    /// Log backed by a fresh [`MemoryLogStore`].
    pub fn memory() -> Self {
        Self::new(MemoryLogStore::shared())
    }

    pub fn with_resolver(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Write an entry and return its id.
    pub async fn record(&self, entry: NewLogEntry) -> Result<i64, RelayError> {
        let source = match entry.source {
            Some(source) => source,
            None => self.resolver.resolve(entry.caller).ok_or_else(|| {
                RelayError::Validation("log entry has no source".to_string())
            })?,
        };
        let context = context::encode(&entry.context)?;

        self.store
            .insert(
                normalize_timestamp(entry.timestamp),
                entry.level,
                &entry.message,
                &source,
                &context,
            )
            .await
    }

    /// Write an entry given a textual level name.
    ///
    /// Unknown level names fail with [`RelayError::Validation`] and nothing is written.
    #[track_caller]
    pub fn insert(
        &self,
        timestamp: DateTime<Utc>,
        level: &str,
        message: impl Into<String>,
        source: Option<&str>,
        context: Value,
    ) -> Pin<Box<dyn Future<Output = Result<i64, RelayError>> + Send + '_>> {
        let entry = match level.parse::<LogLevel>() {
            Ok(level) => {
                let mut entry = NewLogEntry::new(level, message)
                    .timestamp(timestamp)
                    .context(context);
                entry.source = source.map(str::to_string);
                Ok(entry)
            }
            Err(e) => Err(e),
        };
        Box::pin(async move { self.record(entry?).await })
    }

    pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, RelayError> {
        let rows = self.store.query(query).await?;
        rows.into_iter().map(into_entry).collect()
    }

    pub async fn count(&self, filter: &LogFilter) -> Result<u64, RelayError> {
        self.store.count(&LogQuery::new(filter.clone())).await
    }

    /// Entries for `ids`. Unknown ids are skipped.
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<LogEntry>, RelayError> {
        let rows = self.store.get_by_ids(ids).await?;
        rows.into_iter().map(into_entry).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<LogEntry>, RelayError> {
        Ok(self.get_by_ids(&[id]).await?.into_iter().next())
    }

    /// Replace level, message and context of an entry. Returns false if it does not exist.
    pub async fn update(&self, id: i64, update: LogUpdate) -> Result<bool, RelayError> {
        let context = context::encode(&update.context)?;
        self.store
            .update(id, update.level, &update.message, &context)
            .await
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, RelayError> {
        self.store.delete_by_ids(ids).await
    }

    pub async fn delete_by_source(&self, source: &str) -> Result<u64, RelayError> {
        self.store.delete_by_source(source).await
    }

    /// Remove every entry. Irreversible.
    pub async fn truncate(&self) -> Result<u64, RelayError> {
        self.store.truncate().await
    }

    /// Remove entries older than `cutoff`. An unset or zero (epoch) cutoff removes nothing.
    pub async fn delete_older_than(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<u64, RelayError> {
        match cutoff {
            Some(cutoff) if cutoff.timestamp() != 0 || cutoff.timestamp_subsec_nanos() != 0 => {
                self.store
                    .delete_older_than(normalize_timestamp(cutoff))
                    .await
            }
            _ => Ok(0),
        }
    }

    /// Remove entries older than `days` before `now`. Zero days removes nothing, and so does
    /// a retention longer than the representable calendar.
    pub async fn purge_older_than_days(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, RelayError> {
        if days == 0 {
            return Ok(0);
        }
        let Some(cutoff) =
            Duration::try_days(i64::from(days)).and_then(|age| now.checked_sub_signed(age))
        else {
            tracing::debug!(days, "Retention reaches before the earliest timestamp, nothing to purge");
            return Ok(0);
        };
        let removed = self.delete_older_than(Some(cutoff)).await?;
        tracing::info!(removed, days, "Purged expired email logs");
        Ok(removed)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

fn into_entry(row: LogRow) -> Result<LogEntry, RelayError> {
    Ok(LogEntry {
        id: row.id,
        timestamp: row.timestamp,
        level: row.level,
        message: row.message,
        source: row.source,
        context: context::decode(&row.context)?,
    })
}
