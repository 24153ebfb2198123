//! Configured delivery connections.
//!
//! A connection pairs a provider type (the `mailer` tag) with the credentials and sender
//! overrides used when routing through it. Connections come from configuration and are
//! read-only to the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::address::is_valid_email;
use crate::error::RelayError;

/// Identifier of a configured connection, unique per installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A configured delivery connection.
///
/// ```
/// use mailroute::Connection;
///
/// let conn = Connection::new("transactional", "webhook")
///     .credential("endpoint", "https://mail.internal/send")
///     .from_email("noreply@example.com", true);
/// assert_eq!(conn.credential_value("endpoint").unwrap(), "https://mail.internal/send");
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    /// Provider type tag, resolved through the [`ConnectionRegistry`](crate::ConnectionRegistry).
    pub mailer: String,
    /// Provider-specific credentials, opaque to the pipeline.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(default)]
    pub force_from_email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default)]
    pub force_from_name: bool,
    /// Remote account this connection authenticates as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Connection {
    pub fn new(id: impl Into<ConnectionId>, mailer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mailer: mailer.into(),
            credentials: BTreeMap::new(),
            from_email: None,
            force_from_email: false,
            from_name: None,
            force_from_name: false,
            account_id: None,
        }
    }

    /// Add a credential entry.
    pub fn credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// Set the connection's sender email, optionally forcing it over the message's own.
    pub fn from_email(mut self, email: impl Into<String>, force: bool) -> Self {
        self.from_email = Some(email.into());
        self.force_from_email = force;
        self
    }

    /// Set the connection's sender name, optionally forcing it over the message's own.
    pub fn from_name(mut self, name: impl Into<String>, force: bool) -> Self {
        self.from_name = Some(name.into());
        self.force_from_name = force;
        self
    }

    /// Set the remote account identifier.
    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Look up a required credential. Missing and empty values are both configuration errors.
    pub fn credential_value(&self, key: &str) -> Result<&str, RelayError> {
        match self.credentials.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(RelayError::Configuration(format!(
                "connection '{}' is missing credential '{}'",
                self.id, key
            ))),
        }
    }

    /// Effective sender email: the message's own unless a forced override is a valid address.
    pub fn resolve_from_email(&self, original: Option<&str>) -> String {
        let configured = self.from_email.as_deref().unwrap_or_default();
        if self.force_from_email && !configured.is_empty() && is_valid_email(configured) {
            return configured.to_string();
        }
        original.unwrap_or(configured).to_string()
    }

    /// Effective sender name: the message's own unless a forced override is non-empty.
    pub fn resolve_from_name(&self, original: Option<&str>) -> String {
        let configured = self.from_name.as_deref().unwrap_or_default();
        if self.force_from_name && !configured.is_empty() {
            return configured.to_string();
        }
        original.unwrap_or(configured).to_string()
    }
}

// Credentials stay out of logs.
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("mailer", &self.mailer)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("from_email", &self.from_email)
            .field("force_from_email", &self.force_from_email)
            .field("from_name", &self.from_name)
            .field("force_from_name", &self.force_from_name)
            .field("account_id", &self.account_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_empty_credentials() {
        let conn = Connection::new("main", "webhook").credential("api_key", "");
        assert!(matches!(
            conn.credential_value("api_key"),
            Err(RelayError::Configuration(msg)) if msg.contains("api_key")
        ));
        assert!(conn.credential_value("endpoint").is_err());
    }

    #[test]
    fn test_forced_from_email_wins_when_valid() {
        let conn = Connection::new("main", "local").from_email("forced@example.com", true);
        assert_eq!(
            conn.resolve_from_email(Some("app@example.com")),
            "forced@example.com"
        );
    }

    #[test]
    fn test_forced_from_email_ignored_when_invalid() {
        let conn = Connection::new("main", "local").from_email("not-an-email", true);
        assert_eq!(conn.resolve_from_email(Some("app@example.com")), "app@example.com");
    }

    #[test]
    fn test_unforced_from_email_only_fills_gaps() {
        let conn = Connection::new("main", "local").from_email("conn@example.com", false);
        assert_eq!(conn.resolve_from_email(Some("app@example.com")), "app@example.com");
        assert_eq!(conn.resolve_from_email(None), "conn@example.com");
    }

    #[test]
    fn test_forced_from_name_requires_non_empty() {
        let conn = Connection::new("main", "local").from_name("", true);
        assert_eq!(conn.resolve_from_name(Some("App")), "App");

        let conn = Connection::new("main", "local").from_name("Support", true);
        assert_eq!(conn.resolve_from_name(Some("App")), "Support");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let conn = Connection::new("main", "webhook").credential("api_key", "s3cr3t");
        let debug = format!("{:?}", conn);
        assert!(debug.contains("api_key"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let conn: Connection =
            serde_json::from_str(r#"{"id":"c1","mailer":"local"}"#).unwrap();
        assert_eq!(conn.id.as_str(), "c1");
        assert!(!conn.force_from_email);
        assert!(conn.credentials.is_empty());
    }
}
