//! SQLite-backed log store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};

use super::entry::{LogFilter, LogQuery};
use super::level::LogLevel;
use super::store::{LogRow, LogStore};
use crate::error::RelayError;

/// Fixed width, so text comparison orders the same as time.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// The envelope's `data` as text, or the raw context when it has no envelope.
const SEARCHABLE_CONTEXT: &str = "CASE WHEN json_valid(context) THEN \
     CASE WHEN json_type(context, '$.schema') = 'integer' AND json_type(context, '$.data') IS NOT NULL \
     THEN COALESCE(json_extract(context, '$.data'), '') ELSE context END \
     ELSE context END";

const SELECT_COLUMNS: &str = "SELECT log_id, timestamp, level, message, source, context FROM email_log";

/// Log store persisted in an `email_log` table.
///
/// ```rust,ignore
/// let store = SqliteLogStore::new("/var/lib/app/mail.db").await?;
/// let relay = Relay::builder(config).log_store(Arc::new(store)).build();
/// ```
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Open (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self, RelayError> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, for tests.
    ///
    /// A single connection that is never recycled, since each connection to
    /// `sqlite::memory:` sees its own database.
    pub async fn in_memory() -> Result<Self, RelayError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool. The schema is created if missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RelayError> {
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize(&self) -> Result<(), RelayError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_log (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level INTEGER NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT '',
                context TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_log_timestamp ON email_log(timestamp)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_log_level ON email_log(level)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RelayError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|ts| ts.and_utc())
        .map_err(|e| RelayError::Storage(format!("bad timestamp '{}': {}", raw, e)))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    let mut keyword = " WHERE ";

    if !filter.levels.is_empty() {
        builder.push(keyword).push("level IN (");
        let mut levels = builder.separated(", ");
        for level in &filter.levels {
            levels.push_bind(level.severity());
        }
        levels.push_unseparated(")");
        keyword = " AND ";
    }

    if let Some(range) = &filter.date_range {
        builder
            .push(keyword)
            .push("timestamp BETWEEN ")
            .push_bind(format_timestamp(range.start))
            .push(" AND ")
            .push_bind(format_timestamp(range.end));
        keyword = " AND ";
    }

    if let Some(search) = &filter.search {
        builder
            .push(keyword)
            .push(SEARCHABLE_CONTEXT)
            .push(" LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push(" WHERE log_id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}

fn row_to_log(row: &SqliteRow) -> Result<LogRow, RelayError> {
    let severity: i64 = row.try_get("level")?;
    let level = LogLevel::from_severity(severity)
        .ok_or_else(|| RelayError::Storage(format!("unknown severity {}", severity)))?;
    let timestamp: String = row.try_get("timestamp")?;

    Ok(LogRow {
        id: row.try_get("log_id")?,
        timestamp: parse_timestamp(&timestamp)?,
        level,
        message: row.try_get("message")?,
        source: row.try_get("source")?,
        context: row.try_get("context")?,
    })
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn insert(
        &self,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: &str,
        source: &str,
        context: &str,
    ) -> Result<i64, RelayError> {
        let result = sqlx::query(
            r"
            INSERT INTO email_log (timestamp, level, message, source, context)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(format_timestamp(timestamp))
        .bind(level.severity())
        .bind(message)
        .bind(source)
        .bind(context)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRow>, RelayError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_filter(&mut builder, &query.filter);
        // LIMIT -1 is unbounded in SQLite
        builder
            .push(" ORDER BY log_id DESC LIMIT ")
            .push_bind(query.limit.map(to_i64).unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(to_i64(query.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_log).collect()
    }

    async fn count(&self, query: &LogQuery) -> Result<u64, RelayError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM email_log");
        push_filter(&mut builder, &query.filter);

        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<LogRow>, RelayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_id_list(&mut builder, ids);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_log).collect()
    }

    async fn update(
        &self,
        id: i64,
        level: LogLevel,
        message: &str,
        context: &str,
    ) -> Result<bool, RelayError> {
        let result = sqlx::query(
            r"
            UPDATE email_log SET level = ?, message = ?, context = ?
            WHERE log_id = ?
            ",
        )
        .bind(level.severity())
        .bind(message)
        .bind(context)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, RelayError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM email_log");
        push_id_list(&mut builder, ids);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64, RelayError> {
        let result = sqlx::query("DELETE FROM email_log WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn truncate(&self) -> Result<u64, RelayError> {
        let result = sqlx::query("DELETE FROM email_log")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RelayError> {
        let result = sqlx::query("DELETE FROM email_log WHERE timestamp < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
