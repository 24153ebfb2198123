//! # Mailroute
//!
//! Route outbound email through configured providers, fall back on failure, and keep a
//! queryable, resendable log of every attempt.
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! MAILROUTE_CONNECTIONS='[
//!   {"id": "primary", "mailer": "webhook", "credentials": {"endpoint": "https://mail.internal/send"}},
//!   {"id": "backup", "mailer": "logger"}
//! ]'
//! MAILROUTE_DEFAULT_CONNECTION=primary
//! MAILROUTE_FALLBACK_CONNECTION=backup
//! MAILROUTE_LOG_RETENTION_DAYS=30
//! ```
//!
//! Build a relay once and send through it:
//! ```rust,ignore
//! use mailroute::prelude::*;
//! use mailroute::providers::{LoggerProvider, WebhookProvider};
//! use std::sync::Arc;
//!
//! let relay = Relay::builder(RelayConfig::from_env()?)
//!     .provider(WebhookProvider::new())
//!     .provider(LoggerProvider::new())
//!     .log_store(Arc::new(SqliteLogStore::new("mail.db").await?))
//!     .build();
//!
//! let email = Email::new()
//!     .from("shop@example.com")
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .text_body("Hello");
//!
//! let dispatch = relay.deliver(&email).await?;
//! ```
//!
//! ## Pipeline
//!
//! Each send picks a primary connection (per-call override, else the configured default,
//! else the first connection), runs its provider, and on failure runs the fallback
//! connection once. Every attempt is written to the [`AuditLog`]. With no connection at all
//! the mail goes to the host's [`DefaultTransport`].
//!
//! Logged emails can be sent again with [`Relay::resend`], which updates the original
//! entry in place instead of adding a new one.
//!
//! ## Feature Flags
//!
//! - `http` - [`WebhookProvider`](providers::WebhookProvider) via reqwest
//! - `sqlite` - [`SqliteLogStore`] via sqlx
//! - `local` - [`LocalProvider`](providers::LocalProvider) and [`testing`] helpers
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `mailroute_attempts_total` | Counter | provider, stage, status | Provider invocations |
//! | `mailroute_attempt_duration_seconds` | Histogram | provider | Attempt duration |
//! | `mailroute_resends_total` | Counter | status | Resent log entries |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the mailroute crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod config;
mod connection;
mod dispatch;
mod email;
mod error;
mod hooks;
mod message;
mod process;
mod registry;
mod resend;

pub mod admin;
pub mod log;
pub mod providers;

#[cfg(feature = "local")]
pub mod testing;

// Re-exports
pub use address::{format_list, is_valid_email, Address, ToAddress};
pub use attachment::Attachment;
pub use config::{
    RelayConfig, ENV_CONNECTIONS, ENV_DEFAULT_CONNECTION, ENV_FALLBACK_CONNECTION,
    ENV_LOG_RETENTION_DAYS,
};
pub use connection::{Connection, ConnectionId};
pub use dispatch::{Attempt, DefaultTransport, Dispatch, Relay, RelayBuilder, Route, SendOptions, Stage};
pub use email::{Email, OutgoingMail};
pub use error::RelayError;
pub use hooks::{FailedDelivery, FailureObserver, Hooks, Interceptor, LogGate};
pub use log::{AuditLog, LogEntry, LogFilter, LogLevel, LogQuery, LogStore, MemoryLogStore};
pub use message::{Body, Message};
pub use process::{DeliveryResult, DeliveryStatus, Process, Provider};
pub use registry::ConnectionRegistry;
pub use resend::{is_html, reconstruct, ResendOutcome, ResendReport};

#[cfg(feature = "sqlite")]
pub use log::SqliteLogStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::admin::EmailLogs;
    pub use crate::Address;
    pub use crate::Attachment;
    pub use crate::AuditLog;
    pub use crate::Connection;
    pub use crate::DeliveryResult;
    pub use crate::DeliveryStatus;
    pub use crate::Email;
    pub use crate::Hooks;
    pub use crate::Provider;
    pub use crate::Relay;
    pub use crate::RelayConfig;
    pub use crate::RelayError;
    pub use crate::SendOptions;
    pub use crate::ToAddress;

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteLogStore;
}
