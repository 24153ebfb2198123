//! Provider that only emits tracing events.
//!
//! Useful for staging environments, or as a last-resort fallback connection that never
//! fails.

use async_trait::async_trait;
use serde_json::json;

use crate::address::format_list;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::message::Message;
use crate::process::{DeliveryResult, Provider};

/// Logs each message instead of sending it.
pub struct LoggerProvider {
    /// If true, log full message details. If false, just the recipient summary.
    log_full: bool,
}

impl LoggerProvider {
    /// Brief output (just recipients).
    pub fn new() -> Self {
        Self { log_full: false }
    }

    /// Full message details, bodies at debug level.
    pub fn full() -> Self {
        Self { log_full: true }
    }

    pub fn log_full(mut self, full: bool) -> Self {
        self.log_full = full;
        self
    }
}

impl Default for LoggerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for LoggerProvider {
    fn slug(&self) -> &str {
        "logger"
    }

    fn name(&self) -> &str {
        "Logger"
    }

    async fn send(
        &self,
        message: &Message,
        connection: &Connection,
    ) -> Result<DeliveryResult, RelayError> {
        let message_id = uuid::Uuid::new_v4().to_string();

        if self.log_full {
            tracing::info!(
                message_id = %message_id,
                connection = %connection.id,
                from = %message.from.formatted(),
                to = %format_list(&message.to),
                cc = %format_list(&message.cc),
                bcc = %format_list(&message.bcc),
                subject = %message.subject,
                html = message.body.is_html(),
                headers = message.headers.len(),
                attachments = message.attachments.len(),
                "Email logged (full)"
            );
            tracing::debug!(body = %message.body.primary(), "Body");
        } else {
            tracing::info!(
                message_id = %message_id,
                connection = %connection.id,
                to = ?message.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
                subject = %message.subject,
                "Email logged"
            );
        }

        Ok(DeliveryResult::succeeded(json!({ "id": message_id, "logged": true }))
            .with_message_id(message_id))
    }
}
