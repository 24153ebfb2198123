//! In-memory provider for development and testing.
//!
//! Captures every message it is asked to send so tests can assert on it.
//!
//! ```rust,ignore
//! use mailroute::providers::LocalProvider;
//! use mailroute::testing::*;
//!
//! #[tokio::test]
//! async fn test_sends_welcome_email() {
//!     let local = LocalProvider::new();
//!     let relay = Relay::builder(config).provider(local.clone()).build();
//!
//!     send_welcome_email(&relay, "user@example.com").await;
//!
//!     assert_email_sent(&local);
//!     assert_email_to(&local, "user@example.com");
//!     assert_email_subject_contains(&local, "Welcome");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::error::RelayError;
use crate::message::Message;
use crate::process::{DeliveryResult, Provider};

/// A message captured by [`LocalProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: String,
    pub message: Message,
    pub connection_id: ConnectionId,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
struct Mailbox {
    /// Newest first.
    messages: Vec<SentMessage>,
    fail_with: Option<String>,
}

/// Provider that keeps sent messages in memory.
///
/// Clones share the same mailbox, so a clone can be registered with a relay while the
/// original stays in the test for assertions.
#[derive(Clone)]
pub struct LocalProvider {
    slug: String,
    required: &'static [&'static str],
    mailbox: Arc<RwLock<Mailbox>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::with_slug("local")
    }

    /// Register under a different provider-type tag, to stand in for a real provider.
    pub fn with_slug(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            required: &[],
            mailbox: Arc::new(RwLock::new(Mailbox::default())),
        }
    }

    /// Credential keys a connection must carry, as a real provider would declare.
    pub fn require_credentials(mut self, keys: &'static [&'static str]) -> Self {
        self.required = keys;
        self
    }

    /// Make every following send return a failed result carrying `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        self.mailbox.write().fail_with = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.mailbox.write().fail_with = None;
    }

    /// Captured messages, newest first.
    pub fn emails(&self) -> Vec<SentMessage> {
        self.mailbox.read().messages.clone()
    }

    pub fn last_email(&self) -> Option<SentMessage> {
        self.mailbox.read().messages.first().cloned()
    }

    pub fn email_count(&self) -> usize {
        self.mailbox.read().messages.len()
    }

    pub fn has_emails(&self) -> bool {
        self.email_count() > 0
    }

    pub fn clear(&self) {
        self.mailbox.write().messages.clear();
    }

    /// Remove and return every captured message.
    pub fn flush(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.mailbox.write().messages)
    }

    /// Whether any message went to `email` (case-insensitive).
    pub fn sent_to(&self, email: &str) -> bool {
        self.mailbox.read().messages.iter().any(|sent| {
            sent.message
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    pub fn sent_with_subject(&self, subject: &str) -> bool {
        self.mailbox
            .read()
            .messages
            .iter()
            .any(|sent| sent.message.subject == subject)
    }

    pub fn find_messages<F>(&self, predicate: F) -> Vec<SentMessage>
    where
        F: Fn(&Message) -> bool,
    {
        self.mailbox
            .read()
            .messages
            .iter()
            .filter(|sent| predicate(&sent.message))
            .cloned()
            .collect()
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn name(&self) -> &str {
        "Local"
    }

    fn required_credentials(&self) -> &[&'static str] {
        self.required
    }

    async fn send(
        &self,
        message: &Message,
        connection: &Connection,
    ) -> Result<DeliveryResult, RelayError> {
        let mut mailbox = self.mailbox.write();
        if let Some(error) = &mailbox.fail_with {
            return Ok(DeliveryResult::failed(json!({ "error": error })));
        }

        let id = uuid::Uuid::new_v4().to_string();
        mailbox.messages.insert(
            0,
            SentMessage {
                id: id.clone(),
                message: message.clone(),
                connection_id: connection.id.clone(),
                sent_at: Utc::now(),
            },
        );

        Ok(DeliveryResult::succeeded(json!({ "id": id })).with_message_id(id))
    }
}
