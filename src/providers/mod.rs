//! Built-in providers.
//!
//! Each provider implements the [`Provider`](crate::Provider) trait and is registered on a
//! [`RelayBuilder`](crate::RelayBuilder). Connections select one through their `mailer` tag.
//!
//! ## Available Providers
//!
//! | Provider | Tag | Feature Flag | Description |
//! |----------|-----|-------------|-------------|
//! | [`WebhookProvider`] | `webhook` | `http` | JSON POST to a configured endpoint |
//! | [`LocalProvider`] | `local` | `local` | In-memory capture for dev/testing |
//! | [`LoggerProvider`] | `logger` | (none) | Logs messages without sending |

#[cfg(feature = "http")]
mod webhook;
#[cfg(feature = "http")]
pub use webhook::{WebhookProvider, DEFAULT_TIMEOUT};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::{LocalProvider, SentMessage};

mod logger;
pub use logger::LoggerProvider;
