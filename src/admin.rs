//! Query surface over the audit log, for admin endpoints and dashboards.
//!
//! [`EmailLogs`] covers what an HTTP layer needs: paginated listing, per-day counts,
//! deletion, resend and export. It speaks in delivery statuses rather than log levels.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::dispatch::Relay;
use crate::error::RelayError;
use crate::log::{DateRange, LogEntry, LogFilter, LogLevel, LogQuery};
use crate::process::DeliveryStatus;
use crate::resend::ResendReport;

pub const DEFAULT_PER_PAGE: usize = 20;

/// Parse a date as `mm/dd/yyyy` or `yyyy-mm-dd`.
///
/// ```
/// use mailroute::admin::parse_date;
///
/// assert_eq!(parse_date("03/09/2024").unwrap(), parse_date("2024-03-09").unwrap());
/// assert!(parse_date("9 March").is_err());
/// ```
pub fn parse_date(raw: &str) -> Result<NaiveDate, RelayError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| RelayError::Validation(format!("invalid date '{}'", raw)))
}

fn status_levels(statuses: &[DeliveryStatus]) -> Vec<LogLevel> {
    statuses.iter().map(|s| s.log_level()).collect()
}

/// Listing parameters. Every filter is optional and they combine with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
    pub statuses: Vec<DeliveryStatus>,
    pub date_range: Option<DateRange>,
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            statuses: Vec::new(),
            date_range: None,
            search: None,
        }
    }
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn status(mut self, status: DeliveryStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Whole days, both inclusive, in either accepted date format.
    pub fn dates(mut self, start: &str, end: &str) -> Result<Self, RelayError> {
        self.date_range = Some(DateRange::days(parse_date(start)?, parse_date(end)?));
        Ok(self)
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = (!text.trim().is_empty()).then_some(text);
        self
    }

    fn filter(&self) -> LogFilter {
        let mut filter = LogFilter::new().levels(status_levels(&self.statuses));
        filter.date_range = self.date_range;
        filter.search = self.search.clone();
        filter
    }
}

/// One page of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPage {
    pub items: Vec<LogEntry>,
    pub total_items: u64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: u64,
}

/// Overall counts plus per-day totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Keyed by `yyyy-mm-dd`.
    pub days: BTreeMap<String, u64>,
}

/// Export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
}

impl FromStr for ExportFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            other => Err(RelayError::Validation(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// Log administration over a [`Relay`].
#[derive(Debug, Clone)]
pub struct EmailLogs {
    relay: Arc<Relay>,
}

impl EmailLogs {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Newest-first page of entries.
    pub async fn list(&self, params: &ListParams) -> Result<LogPage, RelayError> {
        if params.page == 0 || params.per_page == 0 {
            return Err(RelayError::Validation(
                "page and per_page must be at least 1".into(),
            ));
        }

        let filter = params.filter();
        let offset = params.per_page.saturating_mul(params.page - 1);
        let log = self.relay.log();

        let items = log
            .query(
                &LogQuery::new(filter.clone())
                    .offset(offset)
                    .limit(params.per_page),
            )
            .await?;
        let total_items = log.count(&filter).await?;

        Ok(LogPage {
            items,
            total_items,
            page: params.page,
            per_page: params.per_page,
            total_pages: total_items.div_ceil(params.per_page as u64),
        })
    }

    /// Matching entries, ignoring pagination.
    pub async fn count(&self, params: &ListParams) -> Result<u64, RelayError> {
        self.relay.log().count(&params.filter()).await
    }

    /// Totals by status, and per-day counts for each day from `start` to `end` inclusive.
    pub async fn stats(
        &self,
        days: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<LogStats, RelayError> {
        let log = self.relay.log();
        let mut stats = LogStats {
            total: log.count(&LogFilter::new()).await?,
            success: log
                .count(&LogFilter::new().level(DeliveryStatus::Succeeded.log_level()))
                .await?,
            failed: log
                .count(&LogFilter::new().level(DeliveryStatus::Failed.log_level()))
                .await?,
            days: BTreeMap::new(),
        };

        if let Some((start, end)) = days {
            let mut day = start;
            while day <= end {
                let count = log
                    .count(&LogFilter::new().date_range(DateRange::day(day)))
                    .await?;
                stats.days.insert(day.format("%Y-%m-%d").to_string(), count);
                match day.checked_add_days(Days::new(1)) {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }

        Ok(stats)
    }

    /// Delete the given entries, or every entry when `ids` is `None`.
    ///
    /// Returns whether anything was removed by id. A flush always reports true.
    pub async fn delete(&self, ids: Option<&[i64]>) -> Result<bool, RelayError> {
        match ids {
            Some(ids) => Ok(self.relay.log().delete_by_ids(ids).await? > 0),
            None => {
                let removed = self.relay.log().truncate().await?;
                tracing::info!(removed, "Flushed email logs");
                Ok(true)
            }
        }
    }

    /// Delete one entry. A missing id is [`RelayError::NotFound`].
    pub async fn delete_one(&self, id: i64) -> Result<(), RelayError> {
        if self.relay.log().delete_by_ids(&[id]).await? == 0 {
            return Err(RelayError::NotFound(format!("log {} does not exist", id)));
        }
        Ok(())
    }

    pub async fn resend(&self, ids: &[i64]) -> Result<ResendReport, RelayError> {
        self.relay.resend(ids).await
    }

    /// Export every matching entry as rows: a header row of field names, then one row of
    /// values per entry.
    ///
    /// No matching entries is [`RelayError::NotFound`].
    pub async fn export(
        &self,
        format: &str,
        statuses: &[DeliveryStatus],
    ) -> Result<String, RelayError> {
        let format: ExportFormat = format.parse()?;
        let filter = LogFilter::new().levels(status_levels(statuses));
        let entries = self.relay.log().query(&LogQuery::new(filter)).await?;
        if entries.is_empty() {
            return Err(RelayError::NotFound("no logs to export".into()));
        }

        let flat: Vec<Map<String, Value>> = entries.iter().map(flatten).collect();
        let header: Vec<String> = flat[0].keys().cloned().collect();

        let mut rows = Vec::with_capacity(flat.len() + 1);
        rows.push(json!(header));
        for row in &flat {
            let values: Vec<Value> = header
                .iter()
                .map(|key| row.get(key).cloned().unwrap_or(Value::Null))
                .collect();
            rows.push(Value::Array(values));
        }

        match format {
            ExportFormat::Json => Ok(serde_json::to_string(&rows)?),
        }
    }
}

fn flatten(entry: &LogEntry) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("log_id".into(), json!(entry.id));
    row.insert(
        "timestamp".into(),
        json!(entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    row.insert("level".into(), json!(entry.level.as_str()));
    row.insert("message".into(), json!(entry.message));
    row.insert("source".into(), json!(entry.source));
    if let Value::Object(context) = &entry.context {
        for (key, value) in context {
            row.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    row
}
