//! In-memory log store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::entry::LogQuery;
use super::level::LogLevel;
use super::store::{LogRow, LogStore};
use crate::error::RelayError;

/// Thread-safe in-memory log store.
///
/// Used in tests and by applications that do not need the log to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<i64, LogRow>,
    last_id: i64,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, query: &LogQuery) -> Vec<LogRow> {
        let inner = self.inner.read();
        inner
            .rows
            .values()
            .rev()
            .filter(|row| query.filter.matches(row.timestamp, row.level, &row.context))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(
        &self,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: &str,
        source: &str,
        context: &str,
    ) -> Result<i64, RelayError> {
        let mut inner = self.inner.write();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.rows.insert(
            id,
            LogRow {
                id,
                timestamp,
                level,
                message: message.to_string(),
                source: source.to_string(),
                context: context.to_string(),
            },
        );
        Ok(id)
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRow>, RelayError> {
        let rows = self.matching(query).into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    async fn count(&self, query: &LogQuery) -> Result<u64, RelayError> {
        Ok(self.matching(query).len() as u64)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<LogRow>, RelayError> {
        let inner = self.inner.read();
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| inner.rows.get(id).cloned())
            .collect())
    }

    async fn update(
        &self,
        id: i64,
        level: LogLevel,
        message: &str,
        context: &str,
    ) -> Result<bool, RelayError> {
        let mut inner = self.inner.write();
        match inner.rows.get_mut(&id) {
            Some(row) => {
                row.level = level;
                row.message = message.to_string();
                row.context = context.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, RelayError> {
        let mut inner = self.inner.write();
        Ok(ids
            .iter()
            .filter(|id| inner.rows.remove(*id).is_some())
            .count() as u64)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64, RelayError> {
        let mut inner = self.inner.write();
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.source != source);
        Ok((before - inner.rows.len()) as u64)
    }

    async fn truncate(&self) -> Result<u64, RelayError> {
        let mut inner = self.inner.write();
        let removed = inner.rows.len() as u64;
        inner.rows.clear();
        Ok(removed)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RelayError> {
        let mut inner = self.inner.write();
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.timestamp >= cutoff);
        Ok((before - inner.rows.len()) as u64)
    }
}
