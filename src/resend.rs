//! Replaying logged emails.
//!
//! A resend rebuilds an [`Email`] from a log entry's snapshot and sends it through the
//! normal pipeline with every log write suppressed. The original entry is then updated
//! once with the new status and response.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::attachment::Attachment;
use crate::dispatch::{Relay, SendOptions};
use crate::email::Email;
use crate::error::RelayError;
use crate::log::{EmailLogContext, LogEntry, LogUpdate};
use crate::process::DeliveryStatus;

const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

fn html_tag() -> Option<&'static Regex> {
    static HTML_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    HTML_TAG.get_or_init(|| Regex::new(r"<[^<]+>").ok()).as_ref()
}

/// Whether `body` contains something that looks like an HTML tag.
///
/// ```
/// assert!(mailroute::is_html("Hello <b>there</b>"));
/// assert!(!mailroute::is_html("Thanks for your order"));
/// ```
pub fn is_html(body: &str) -> bool {
    html_tag().is_some_and(|re| re.is_match(body))
}

/// Rebuild a sendable email from a logged snapshot.
///
/// The body becomes HTML or plain text depending on [`is_html`], with a matching
/// `Content-Type` header. File attachments are re-attached when the file still exists;
/// byte attachments were never stored and are dropped.
pub fn reconstruct(context: &EmailLogContext) -> Email {
    let mut email = Email::new().subject(context.subject.clone());

    if !context.from.email.is_empty() {
        email.from = Some(context.from.clone());
    }
    email = email.put_to(context.recipients.to.clone());
    email.cc = context.recipients.cc.clone();
    email.bcc = context.recipients.bcc.clone();
    email.reply_to = context.recipients.reply_to.clone();

    email = if is_html(&context.body) {
        email
            .html_body(context.body.clone())
            .header("Content-Type", HTML_CONTENT_TYPE)
    } else {
        email
            .text_body(context.body.clone())
            .header("Content-Type", TEXT_CONTENT_TYPE)
    };

    for (name, value) in &context.headers {
        email = email.header(name.clone(), value.clone());
    }
    if let Some(return_path) = &context.return_path {
        email = email.header("Return-Path", return_path.clone());
    }

    for record in &context.attachments {
        let Some(path) = &record.path else {
            tracing::warn!(filename = %record.filename, "Attachment content was not logged, skipping");
            continue;
        };
        match Attachment::from_path(Path::new(path)) {
            Ok(attachment) => {
                email = email.attachment(attachment.content_type(record.content_type.clone()));
            }
            Err(e) => tracing::warn!(path = %path, error = %e, "Skipping attachment"),
        }
    }

    email
}

/// What happened to one requested id.
#[derive(Debug, Clone, PartialEq)]
pub enum ResendOutcome {
    /// Sent again and the entry was updated.
    Resent {
        id: i64,
        status: DeliveryStatus,
        resend_count: u32,
    },
    /// No entry with this id.
    Missing { id: i64 },
    /// The entry could not be resent, or was resent but not updated.
    Error { id: i64, error: String },
}

impl ResendOutcome {
    pub fn id(&self) -> i64 {
        match self {
            ResendOutcome::Resent { id, .. }
            | ResendOutcome::Missing { id }
            | ResendOutcome::Error { id, .. } => *id,
        }
    }
}

/// Per-id outcomes of a resend batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResendReport {
    pub outcomes: Vec<ResendOutcome>,
}

impl ResendReport {
    /// True when at least one entry went through the pipeline again, whatever the
    /// delivery outcome.
    pub fn success(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, ResendOutcome::Resent { .. }))
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    ResendOutcome::Resent {
                        status: DeliveryStatus::Succeeded,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn outcome(&self, id: i64) -> Option<&ResendOutcome> {
        self.outcomes.iter().find(|o| o.id() == id)
    }
}

impl Relay {
    /// Resend the logged emails with the given ids.
    ///
    /// An empty id list is a [`RelayError::Validation`]; ids that all miss are
    /// [`RelayError::NotFound`]. Otherwise per-entry failures are reported in the
    /// [`ResendReport`] and never fail the batch.
    pub async fn resend(&self, ids: &[i64]) -> Result<ResendReport, RelayError> {
        if ids.is_empty() {
            return Err(RelayError::Validation("no log ids provided".into()));
        }

        // Each entry is resent at most once per batch, whatever the store returns.
        let mut requested = HashSet::new();
        let ids: Vec<i64> = ids.iter().copied().filter(|id| requested.insert(*id)).collect();

        let entries = self.log().get_by_ids(&ids).await?;
        if entries.is_empty() {
            return Err(RelayError::NotFound("no logs found for the given ids".into()));
        }

        let mut found = HashSet::new();
        let mut report = ResendReport::default();
        for entry in entries {
            if found.insert(entry.id) {
                report.outcomes.push(self.resend_entry(entry).await);
            }
        }
        for id in &ids {
            if !found.contains(id) {
                report.outcomes.push(ResendOutcome::Missing { id: *id });
            }
        }

        tracing::info!(
            requested = ids.len(),
            delivered = report.delivered(),
            "Resend batch finished"
        );
        Ok(report)
    }

    async fn resend_entry(&self, entry: LogEntry) -> ResendOutcome {
        let id = entry.id;
        let context = match entry.email_context() {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(log_id = id, error = %e, "Log entry is not an email snapshot");
                return ResendOutcome::Error {
                    id,
                    error: e.to_string(),
                };
            }
        };

        let email = reconstruct(&context);
        let options = SendOptions::new().log_gate(|_: &EmailLogContext| true);

        let (status, response) = match self.deliver_with(&email, &options).await {
            Ok(dispatch) => match dispatch.final_result() {
                Some(result) => (result.status, result.response.clone()),
                None if dispatch.delivered => (DeliveryStatus::Succeeded, Value::Null),
                None => (DeliveryStatus::Failed, Value::Null),
            },
            Err(e) => {
                tracing::warn!(log_id = id, error = %e, "Resend did not reach a provider");
                return ResendOutcome::Error {
                    id,
                    error: e.to_string(),
                };
            }
        };

        #[cfg(feature = "metrics")]
        metrics::counter!("mailroute_resends_total", "status" => status.as_str()).increment(1);

        let mut updated = context.clone();
        if status.is_success() && context.status.is_success() {
            updated.resend_count += 1;
        }
        updated.status = status;
        updated.response = response;

        let update = match updated.to_value() {
            Ok(value) => LogUpdate {
                level: status.log_level(),
                message: entry.message.clone(),
                context: value,
            },
            Err(e) => {
                return ResendOutcome::Error {
                    id,
                    error: e.to_string(),
                }
            }
        };

        match self.log().update(id, update).await {
            Ok(_) => ResendOutcome::Resent {
                id,
                status,
                resend_count: updated.resend_count,
            },
            Err(e) => {
                tracing::error!(log_id = id, error = %e, "Failed to update resent email log");
                ResendOutcome::Error {
                    id,
                    error: format!("resent ({}) but the log update failed: {}", status, e),
                }
            }
        }
    }
}
