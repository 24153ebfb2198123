//! Testing utilities and assertion helpers.
//!
//! Assertions over messages captured by [`LocalProvider`] and entries in an [`AuditLog`].
//! Failures panic with a summary of what was actually sent or logged.
//!
//! # Example
//!
//! ```rust,ignore
//! use mailroute::providers::LocalProvider;
//! use mailroute::testing::*;
//!
//! #[tokio::test]
//! async fn test_welcome_flow() {
//!     let local = LocalProvider::new();
//!     let relay = Relay::builder(config).provider(local.clone()).build();
//!
//!     // ... trigger email sending ...
//!
//!     assert_email_sent(&local);
//!     assert_email_to(&local, "user@example.com");
//!     assert_email_subject_matches(&local, r"Welcome.*!");
//!     assert_logged(relay.log(), DeliveryStatus::Succeeded, 1).await;
//! }
//! ```

use regex::Regex;

use crate::log::{AuditLog, LogEntry, LogFilter, LogQuery};
use crate::process::DeliveryStatus;
use crate::providers::{LocalProvider, SentMessage};

fn format_summary(sent: &[SentMessage]) -> String {
    if sent.is_empty() {
        return "  (no emails sent)".to_string();
    }

    sent.iter()
        .enumerate()
        .map(|(i, s)| {
            let to = s
                .message
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\", Connection: {}",
                i + 1,
                to,
                s.message.from.email,
                s.message.subject,
                s.connection_id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_log_summary(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "  (no log entries)".to_string();
    }

    entries
        .iter()
        .map(|e| {
            format!(
                "  #{} [{}] {} (source: {})",
                e.id, e.level, e.message, e.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(body: &str) -> String {
    body.chars().take(500).collect()
}

fn last_sent(local: &LocalProvider) -> SentMessage {
    local
        .last_email()
        .expect("Expected at least one email to be sent, but none were sent")
}

// ============================================================================
// Sent Messages
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(local: &LocalProvider) {
    assert!(
        local.has_emails(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
pub fn assert_no_emails_sent(local: &LocalProvider) {
    let sent = local.emails();
    assert!(
        sent.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        sent.len(),
        format_summary(&sent)
    );
}

/// Assert that exactly N emails were sent.
pub fn assert_email_count(local: &LocalProvider, expected: usize) {
    let actual = local.email_count();
    assert!(
        actual == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        actual,
        format_summary(&local.emails())
    );
}

/// Assert that an email was sent to a specific address.
pub fn assert_email_to(local: &LocalProvider, email: &str) {
    assert!(
        local.sent_to(email),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        email,
        format_summary(&local.emails())
    );
}

/// Assert that no email was sent to a specific address.
pub fn refute_email_to(local: &LocalProvider, email: &str) {
    assert!(
        !local.sent_to(email),
        "Expected no email to be sent to '{}', but found one.\n\nEmails sent:\n{}",
        email,
        format_summary(&local.emails())
    );
}

/// Assert that an email with the exact subject was sent.
pub fn assert_email_subject(local: &LocalProvider, subject: &str) {
    assert!(
        local.sent_with_subject(subject),
        "Expected an email with subject '{}'.\n\nEmails sent:\n{}",
        subject,
        format_summary(&local.emails())
    );
}

/// Assert that an email with subject containing text was sent.
pub fn assert_email_subject_contains(local: &LocalProvider, text: &str) {
    let found = !local.find_messages(|m| m.subject.contains(text)).is_empty();
    assert!(
        found,
        "Expected an email with subject containing '{}'.\n\nEmails sent:\n{}",
        text,
        format_summary(&local.emails())
    );
}

/// Assert the last email subject matches a regex pattern.
///
/// # Panics
///
/// Panics if no email was sent, the pattern is invalid, or the subject doesn't match.
pub fn assert_email_subject_matches(local: &LocalProvider, pattern: &str) {
    let last = last_sent(local);
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(&last.message.subject),
        "Expected subject to match pattern '{}', but was '{}'.\n\nLast email:\n{}",
        pattern,
        last.message.subject,
        format_summary(std::slice::from_ref(&last))
    );
}

/// Assert the last email's primary body contains text.
pub fn assert_email_body_contains(local: &LocalProvider, text: &str) {
    let last = last_sent(local);
    let body = last.message.body.primary();

    assert!(
        body.contains(text),
        "Expected body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nBody (first 500 chars):\n{}",
        text,
        format_summary(std::slice::from_ref(&last)),
        preview(body)
    );
}

/// Assert the last email carries a header with this value.
pub fn assert_email_header(local: &LocalProvider, name: &str, value: &str) {
    let last = last_sent(local);
    let actual = last.message.headers.get(name);

    assert!(
        actual.map(String::as_str) == Some(value),
        "Expected header '{}: {}', but found {:?}.\n\nLast email:\n{}",
        name,
        value,
        actual,
        format_summary(std::slice::from_ref(&last))
    );
}

/// Assert the last email was sent from a specific address.
pub fn assert_email_from(local: &LocalProvider, from_email: &str) {
    let last = last_sent(local);

    assert!(
        last.message.from.email.eq_ignore_ascii_case(from_email),
        "Expected last email from '{}', but was from '{}'.\n\nLast email:\n{}",
        from_email,
        last.message.from.email,
        format_summary(std::slice::from_ref(&last))
    );
}

/// Assert the last email has an attachment with the given filename.
pub fn assert_email_has_attachment(local: &LocalProvider, filename: &str) {
    let last = last_sent(local);
    let names = last
        .message
        .attachments
        .iter()
        .map(|a| a.filename.as_str())
        .collect::<Vec<_>>();

    assert!(
        names.contains(&filename),
        "Expected email to have attachment '{}'.\n\nLast email:\n{}\n\nAttachments: [{}]",
        filename,
        format_summary(std::slice::from_ref(&last)),
        names.join(", ")
    );
}

// ============================================================================
// Audit Log
// ============================================================================

/// Assert the log holds exactly `expected` entries with this delivery status.
///
/// # Panics
///
/// Panics if the count differs or the log cannot be read.
pub async fn assert_logged(log: &AuditLog, status: DeliveryStatus, expected: u64) {
    let actual = log
        .count(&LogFilter::new().level(status.log_level()))
        .await
        .expect("Failed to read the audit log");

    if actual != expected {
        let entries = log
            .query(&LogQuery::all())
            .await
            .expect("Failed to read the audit log");
        panic!(
            "Expected {} {} log entr{}, but found {}.\n\nLog entries:\n{}",
            expected,
            status,
            if expected == 1 { "y" } else { "ies" },
            actual,
            format_log_summary(&entries)
        );
    }
}

/// Assert nothing was logged.
pub async fn assert_nothing_logged(log: &AuditLog) {
    let entries = log
        .query(&LogQuery::all())
        .await
        .expect("Failed to read the audit log");
    assert!(
        entries.is_empty(),
        "Expected no log entries, but found {}.\n\nLog entries:\n{}",
        entries.len(),
        format_log_summary(&entries)
    );
}

/// Newest log entry, or panic if the log is empty.
pub async fn last_log_entry(log: &AuditLog) -> LogEntry {
    log.query(&LogQuery::all().limit(1))
        .await
        .expect("Failed to read the audit log")
        .into_iter()
        .next()
        .expect("Expected at least one log entry, but the log is empty")
}
