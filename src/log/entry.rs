//! Log entry values and query parameters.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::Location;

use super::context::{self, EmailLogContext};
use super::level::LogLevel;
use crate::error::RelayError;

/// Timestamps are stored with microsecond precision.
pub(crate) fn normalize_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// A persisted log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Store-assigned, monotonically increasing.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub context: Value,
}

impl LogEntry {
    /// Decode the context as an email delivery snapshot.
    pub fn email_context(&self) -> Result<EmailLogContext, RelayError> {
        Ok(serde_json::from_value(self.context.clone())?)
    }
}

/// A log entry waiting to be written.
///
/// Creation records the caller's location, which a
/// [`SourceResolver`](super::SourceResolver) may use when no source is given.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: Option<String>,
    pub context: Value,
    pub(crate) caller: &'static Location<'static>,
}

impl NewLogEntry {
    #[track_caller]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source: None,
            context: Value::Null,
            caller: Location::caller(),
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Where this entry was created.
    pub fn caller(&self) -> &'static Location<'static> {
        self.caller
    }
}

/// Replacement values for [`AuditLog::update`](super::AuditLog::update).
///
/// Timestamp and source are never touched by an update.
#[derive(Debug, Clone, PartialEq)]
pub struct LogUpdate {
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Inclusive timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// From 00:00:00 on `from` through the last microsecond of `to`, UTC.
    pub fn days(from: NaiveDate, to: NaiveDate) -> Self {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to.and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
            - Duration::microseconds(1);
        Self { start, end }
    }

    /// A single calendar day.
    pub fn day(date: NaiveDate) -> Self {
        Self::days(date, date)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Row predicate shared by queries and counts. Absent axes do not restrict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub levels: Vec<LogLevel>,
    pub date_range: Option<DateRange>,
    /// Substring matched against the serialized context data, ASCII case-insensitive.
    /// The envelope around the data (`schema`, `writer`) is not searched.
    pub search: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Empty search text is treated as no search.
    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.is_empty() { None } else { Some(text) };
        self
    }

    pub(crate) fn matches(
        &self,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        encoded_context: &str,
    ) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&level) {
            return false;
        }
        if let Some(range) = &self.date_range {
            if !range.contains(timestamp) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let haystack = context::search_text(encoded_context).to_ascii_lowercase();
            if !haystack.contains(&search.to_ascii_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// A filtered, paginated read. Results are newest first by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQuery {
    pub filter: LogFilter,
    pub offset: usize,
    /// `None` means no limit.
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn new(filter: LogFilter) -> Self {
        Self {
            filter,
            offset: 0,
            limit: None,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_range_is_inclusive() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let range = DateRange::day(date);
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()));
        assert!(range.contains(
            Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap() + Duration::microseconds(999_999)
        ));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_filter_axes_are_conjunctive() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let filter = LogFilter::new()
            .level(LogLevel::Error)
            .search("Invoice");

        assert!(filter.matches(ts, LogLevel::Error, r#"{"subject":"invoice 42"}"#));
        assert!(!filter.matches(ts, LogLevel::Info, r#"{"subject":"invoice 42"}"#));
        assert!(!filter.matches(ts, LogLevel::Error, r#"{"subject":"receipt"}"#));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = LogFilter::new().search("");
        assert!(filter.search.is_none());
        assert!(filter.matches(Utc::now(), LogLevel::Debug, ""));
    }

    #[test]
    fn test_new_entry_records_caller() {
        let entry = NewLogEntry::new(LogLevel::Info, "hello");
        assert!(entry.caller().file().ends_with("entry.rs"));
    }

    #[test]
    fn test_normalize_truncates_to_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + Duration::nanoseconds(1_234_567);
        assert_eq!(
            normalize_timestamp(ts).timestamp_subsec_nanos(),
            1_234_000
        );
    }
}
