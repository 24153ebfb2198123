//! Relay configuration.
//!
//! Built once and handed to [`Relay::builder`](crate::Relay::builder); the pipeline never
//! reads environment or global state while dispatching.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `MAILROUTE_CONNECTIONS` | JSON array of connections |
//! | `MAILROUTE_DEFAULT_CONNECTION` | Id of the default connection |
//! | `MAILROUTE_FALLBACK_CONNECTION` | Id of the fallback connection |
//! | `MAILROUTE_LOG_RETENTION_DAYS` | Days to keep log entries (unset or 0 keeps forever) |

use serde::{Deserialize, Serialize};
use std::env;

use crate::connection::{Connection, ConnectionId};
use crate::error::RelayError;

pub const ENV_CONNECTIONS: &str = "MAILROUTE_CONNECTIONS";
pub const ENV_DEFAULT_CONNECTION: &str = "MAILROUTE_DEFAULT_CONNECTION";
pub const ENV_FALLBACK_CONNECTION: &str = "MAILROUTE_FALLBACK_CONNECTION";
pub const ENV_LOG_RETENTION_DAYS: &str = "MAILROUTE_LOG_RETENTION_DAYS";

/// Connections and routing settings.
///
/// ```
/// use mailroute::{Connection, RelayConfig};
///
/// let config = RelayConfig::new()
///     .connection(Connection::new("primary", "webhook").credential("endpoint", "https://a"))
///     .connection(Connection::new("backup", "logger"))
///     .default_connection("primary")
///     .fallback_connection("backup");
/// assert_eq!(config.connections.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_connection: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_connection: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn default_connection(mut self, id: impl Into<ConnectionId>) -> Self {
        self.default_connection = Some(id.into());
        self
    }

    pub fn fallback_connection(mut self, id: impl Into<ConnectionId>) -> Self {
        self.fallback_connection = Some(id.into());
        self
    }

    pub fn log_retention_days(mut self, days: u32) -> Self {
        self.log_retention_days = Some(days);
        self
    }

    /// Parse a JSON document with the same shape as the struct.
    pub fn from_json_str(json: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `MAILROUTE_*` environment variables. Unset variables leave defaults.
    pub fn from_env() -> Result<Self, RelayError> {
        let connections = match env::var(ENV_CONNECTIONS) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                RelayError::Configuration(format!("{} is not valid JSON: {}", ENV_CONNECTIONS, e))
            })?,
            _ => Vec::new(),
        };

        let log_retention_days = match non_empty_var(ENV_LOG_RETENTION_DAYS) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                RelayError::Configuration(format!(
                    "{} must be a whole number of days, got '{}'",
                    ENV_LOG_RETENTION_DAYS, raw
                ))
            })?),
            None => None,
        };

        let config = Self {
            connections,
            default_connection: non_empty_var(ENV_DEFAULT_CONNECTION).map(ConnectionId::from),
            fallback_connection: non_empty_var(ENV_FALLBACK_CONNECTION).map(ConnectionId::from),
            log_retention_days,
        };
        config.validate()?;

        tracing::debug!(
            connections = config.connections.len(),
            default = ?config.default_connection,
            fallback = ?config.fallback_connection,
            "Loaded relay configuration from environment"
        );
        Ok(config)
    }

    /// Connection ids must be unique.
    pub fn validate(&self) -> Result<(), RelayError> {
        for (i, conn) in self.connections.iter().enumerate() {
            if conn.id.as_str().is_empty() {
                return Err(RelayError::Configuration(
                    "connection id must not be empty".into(),
                ));
            }
            if self.connections[..i].iter().any(|c| c.id == conn.id) {
                return Err(RelayError::Configuration(format!(
                    "duplicate connection id '{}'",
                    conn.id
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = RelayConfig::from_json_str(
            r#"{
                "connections": [
                    {"id": "a", "mailer": "webhook", "credentials": {"endpoint": "https://x"}},
                    {"id": "b", "mailer": "logger"}
                ],
                "default_connection": "a",
                "fallback_connection": "b",
                "log_retention_days": 30
            }"#,
        )
        .unwrap();
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.default_connection, Some(ConnectionId::new("a")));
        assert_eq!(config.log_retention_days, Some(30));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = RelayConfig::from_json_str(
            r#"{"connections": [{"id": "a", "mailer": "x"}, {"id": "a", "mailer": "y"}]}"#,
        );
        assert!(matches!(result, Err(RelayError::Configuration(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_from_env() {
        env::set_var(
            ENV_CONNECTIONS,
            r#"[{"id": "env", "mailer": "logger"}]"#,
        );
        env::set_var(ENV_DEFAULT_CONNECTION, "env");
        env::set_var(ENV_LOG_RETENTION_DAYS, "7");

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.connections[0].id.as_str(), "env");
        assert_eq!(config.default_connection, Some(ConnectionId::new("env")));
        assert_eq!(config.log_retention_days, Some(7));

        env::set_var(ENV_LOG_RETENTION_DAYS, "a week");
        assert!(RelayConfig::from_env().is_err());

        env::remove_var(ENV_CONNECTIONS);
        env::remove_var(ENV_DEFAULT_CONNECTION);
        env::remove_var(ENV_LOG_RETENTION_DAYS);
    }
}
