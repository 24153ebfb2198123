//! Provider trait, delivery results and the per-attempt [`Process`].
//!
//! # Why `async_trait`?
//!
//! Providers are resolved at runtime from a connection's `mailer` tag, so the registry
//! stores them as `Arc<dyn Provider>`. Native async traits are not object-safe; the macro
//! boxes each future instead. Delivery is network-bound, so the allocation does not matter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::connection::Connection;
use crate::email::OutgoingMail;
use crate::error::RelayError;
use crate::hooks::{FailedDelivery, Hooks, LogGate};
use crate::log::{AttachmentRecord, AuditLog, EmailLogContext, LogLevel, NewLogEntry, Recipients};
use crate::message::Message;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Succeeded,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Succeeded => "succeeded",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Level the attempt is logged at.
    pub fn log_level(self) -> LogLevel {
        match self {
            DeliveryStatus::Succeeded => LogLevel::Info,
            DeliveryStatus::Failed => LogLevel::Error,
        }
    }

    pub fn is_success(self) -> bool {
        self == DeliveryStatus::Succeeded
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "succeeded" | "success" => Ok(DeliveryStatus::Succeeded),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(RelayError::Validation(format!(
                "unknown delivery status '{}'",
                other
            ))),
        }
    }
}

/// Result of one provider invocation. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    /// Raw provider payload, success body or error details.
    pub response: Value,
    /// Message id assigned by the provider, when it returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn succeeded(response: Value) -> Self {
        Self {
            status: DeliveryStatus::Succeeded,
            response,
            message_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn failed(response: Value) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            response,
            message_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Failed result describing a local error.
    pub fn from_error(error: &RelayError) -> Self {
        Self::failed(json!({ "error": error.to_string() }))
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A delivery backend.
///
/// Implementations perform at most one network call per [`send`](Provider::send) with a
/// finite timeout. Remote rejections are returned as [`DeliveryResult::failed`] (or as a
/// recoverable [`RelayError::Provider`]/[`RelayError::Http`]), never as a panic.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use mailroute::{Connection, DeliveryResult, Message, Provider, RelayError};
///
/// struct Null;
///
/// #[async_trait]
/// impl Provider for Null {
///     fn slug(&self) -> &str {
///         "null"
///     }
///
///     async fn send(&self, _: &Message, _: &Connection) -> Result<DeliveryResult, RelayError> {
///         Ok(DeliveryResult::succeeded(serde_json::Value::Null))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider-type tag that connections reference in their `mailer` field.
    fn slug(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.slug()
    }

    /// Credential keys that must be present and non-empty on a connection.
    fn required_credentials(&self) -> &[&'static str] {
        &[]
    }

    /// Check a connection before sending. The default checks required credentials.
    fn validate_connection(&self, connection: &Connection) -> Result<(), RelayError> {
        for key in self.required_credentials() {
            connection.credential_value(key)?;
        }
        Ok(())
    }

    async fn send(
        &self,
        message: &Message,
        connection: &Connection,
    ) -> Result<DeliveryResult, RelayError>;
}

/// One delivery attempt: a provider, a connection and the message extracted for it.
pub struct Process {
    provider: Arc<dyn Provider>,
    connection: Connection,
    message: Message,
}

impl Process {
    /// Extract the message from `mail` as seen through `connection`.
    pub fn initialize(
        provider: Arc<dyn Provider>,
        connection: Connection,
        mail: &dyn OutgoingMail,
    ) -> Self {
        let message = Message::extract(mail, &connection);
        Self {
            provider,
            connection,
            message,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn provider_slug(&self) -> &str {
        self.provider.slug()
    }

    /// Run the provider.
    ///
    /// Remote failures come back as a failed result. Only local faults (missing
    /// credentials, unreadable attachments) are returned as errors.
    pub async fn send(&self) -> Result<DeliveryResult, RelayError> {
        self.provider.validate_connection(&self.connection)?;

        match self.provider.send(&self.message, &self.connection).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_recoverable() => {
                let mut response = json!({ "error": e.to_string() });
                if let RelayError::Provider {
                    status: Some(status),
                    ..
                } = &e
                {
                    response["status"] = json!(status);
                }
                Ok(DeliveryResult::failed(response))
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot of this attempt for the audit log.
    pub fn log_context(&self, result: &DeliveryResult) -> EmailLogContext {
        let message = &self.message;
        EmailLogContext {
            subject: message.subject.clone(),
            body: message.body.primary().to_string(),
            headers: message.headers.clone(),
            attachments: message
                .attachments
                .iter()
                .map(AttachmentRecord::from)
                .collect(),
            from: message.from.clone(),
            recipients: Recipients {
                to: message.to.clone(),
                cc: message.cc.clone(),
                bcc: message.bcc.clone(),
                reply_to: message.reply_to.clone(),
            },
            return_path: message.return_path.clone(),
            status: result.status,
            response: result.response.clone(),
            provider: self.provider.slug().to_string(),
            connection_id: self.connection.id.to_string(),
            account_id: self.connection.account_id.clone(),
            resend_count: 0,
        }
    }

    /// Notify failure observers when the attempt failed, run the context filters, then
    /// persist the snapshot unless a gate suppresses the write.
    ///
    /// Returns the new entry's id, or `None` when suppressed.
    pub async fn log_result(
        &self,
        result: &DeliveryResult,
        log: &AuditLog,
        hooks: &Hooks,
        gate: Option<&dyn LogGate>,
    ) -> Result<Option<i64>, RelayError> {
        let context = self.log_context(result);

        if !result.is_success() {
            hooks.notify_failure(&FailedDelivery {
                connection_id: self.connection.id.clone(),
                provider: context.provider.clone(),
                to: context.recipients.to.clone(),
                subject: context.subject.clone(),
                response: context.response.clone(),
            });
        }

        let context = hooks.apply_context_filters(context);
        let suppressed = hooks.suppress_log(&context) | gate.is_some_and(|g| g.suppress(&context));
        if suppressed {
            tracing::debug!(connection = %self.connection.id, "Log write suppressed");
            return Ok(None);
        }

        let entry = NewLogEntry::new(result.status.log_level(), context.subject.clone())
            .timestamp(result.occurred_at)
            .source(context.provider.clone())
            .context(context.to_value()?);
        log.record(entry).await.map(Some)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("provider", &self.provider.slug())
            .field("connection", &self.connection)
            .field("message", &self.message)
            .finish()
    }
}
