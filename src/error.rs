//! Error types for mailroute.

use thiserror::Error;

/// Errors that can occur while routing, logging or resending emails.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// No connection resolved and no default transport is installed.
    #[error("No delivery connection configured")]
    NotConfigured,

    /// Connection or provider misconfiguration (missing credential, unknown provider type, ...).
    ///
    /// Fatal for the attempt that raised it; the pipeline moves on to the fallback.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing required field (e.g., from address).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Attachment has no content (neither data nor path provided).
    #[error("Attachment has no content: {0}")]
    AttachmentMissingContent(String),

    /// Attachment file not found.
    #[error("Attachment file not found: {0}")]
    AttachmentFileNotFound(String),

    /// Failed to read attachment file.
    #[error("Failed to read attachment: {0}")]
    AttachmentReadError(String),

    /// The remote provider rejected or errored on the request.
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        /// Optional HTTP status code
        status: Option<u16>,
    },

    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Log persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed caller input (empty id batch, unknown log level, unknown export format, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Blocked by an interceptor.
    #[error("Blocked: {0}")]
    Blocked(String),
}

impl RelayError {
    /// Create a provider-specific error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a provider error with HTTP status.
    pub fn provider_with_status(
        provider: impl Into<String>,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Whether the failure came from the remote side and should drive the fallback
    /// rather than abort.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Http(_))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
