//! The dispatch pipeline.
//!
//! Each send resolves a [`Route`], runs the primary connection's provider and, when that
//! attempt fails, runs the fallback connection once. Every attempt is logged on its own.
//!
//! ```text
//! Start ──► Primary ──succeeded──► Done
//!              │
//!              └─failed──► Fallback (if configured and distinct) ──► Done
//! ```
//!
//! No connection at all routes the mail to the host's [`DefaultTransport`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::config::RelayConfig;
use crate::connection::{Connection, ConnectionId};
use crate::email::Email;
use crate::error::RelayError;
use crate::hooks::{Hooks, LogGate};
use crate::log::{AuditLog, LogStore};
use crate::message::Message;
use crate::process::{DeliveryResult, Process, Provider};
use crate::registry::ConnectionRegistry;

/// Which leg of the pipeline an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Primary,
    Fallback,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Primary => "primary",
            Stage::Fallback => "fallback",
        }
    }
}

/// Connections chosen for one send.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub primary: Connection,
    /// Present only when configured, known, and different from the primary.
    pub fallback: Option<Connection>,
}

/// One provider invocation within a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub stage: Stage,
    pub connection_id: ConnectionId,
    /// The connection's provider-type tag.
    pub provider: String,
    pub result: DeliveryResult,
    /// Audit log entry, unless the write was suppressed or failed.
    pub log_id: Option<i64>,
}

/// Outcome of a send.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub delivered: bool,
    pub attempts: Vec<Attempt>,
    /// True when no connection resolved and the default transport handled the mail.
    pub via_default_transport: bool,
}

impl Dispatch {
    /// Result of the last attempt made.
    pub fn final_result(&self) -> Option<&DeliveryResult> {
        self.attempts.last().map(|a| &a.result)
    }
}

/// The host's own mail path, used when no connection is configured.
#[async_trait]
pub trait DefaultTransport: Send + Sync {
    async fn send(&self, email: &Email) -> bool;
}

/// Per-send overrides.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Use this connection instead of the configured default.
    pub connection: Option<ConnectionId>,
    /// Extra gate consulted before every log write of this send.
    pub log_gate: Option<Arc<dyn LogGate>>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(mut self, id: impl Into<ConnectionId>) -> Self {
        self.connection = Some(id.into());
        self
    }

    pub fn log_gate(mut self, gate: impl LogGate + 'static) -> Self {
        self.log_gate = Some(Arc::new(gate));
        self
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("connection", &self.connection)
            .field("log_gate", &self.log_gate.is_some())
            .finish()
    }
}

/// Stands in for a `mailer` tag with no registered provider; every send fails closed.
struct Unregistered {
    mailer: String,
}

#[async_trait]
impl Provider for Unregistered {
    fn slug(&self) -> &str {
        &self.mailer
    }

    async fn send(&self, _: &Message, connection: &Connection) -> Result<DeliveryResult, RelayError> {
        Err(RelayError::Configuration(format!(
            "connection '{}' uses unregistered provider '{}'",
            connection.id, self.mailer
        )))
    }
}

/// The relay: configuration, providers, audit log and hooks.
///
/// ```rust,ignore
/// use mailroute::{Email, Relay, RelayConfig};
///
/// let relay = Relay::builder(RelayConfig::from_env()?)
///     .provider(WebhookProvider::new())
///     .build();
///
/// let dispatch = relay.deliver(&email).await?;
/// if !dispatch.delivered {
///     // every attempt is in relay.log()
/// }
/// ```
pub struct Relay {
    config: RelayConfig,
    registry: ConnectionRegistry,
    log: AuditLog,
    hooks: Hooks,
    default_transport: Option<Arc<dyn DefaultTransport>>,
}

/// Builder for [`Relay`].
pub struct RelayBuilder {
    config: RelayConfig,
    registry: ConnectionRegistry,
    log: Option<AuditLog>,
    hooks: Hooks,
    default_transport: Option<Arc<dyn DefaultTransport>>,
}

impl RelayBuilder {
    pub fn provider(mut self, provider: impl Provider + 'static) -> Self {
        self.registry.register_provider(Arc::new(provider));
        self
    }

    pub fn provider_arc(mut self, provider: Arc<dyn Provider>) -> Self {
        self.registry.register_provider(provider);
        self
    }

    /// Add a connection besides those in the config.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.registry.add_connection(connection);
        self
    }

    pub fn log(mut self, log: AuditLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.log = Some(AuditLog::new(store));
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn default_transport(mut self, transport: impl DefaultTransport + 'static) -> Self {
        self.default_transport = Some(Arc::new(transport));
        self
    }

    /// Without an explicit log, attempts go to an in-memory store.
    pub fn build(self) -> Relay {
        Relay {
            config: self.config,
            registry: self.registry,
            log: self.log.unwrap_or_else(AuditLog::memory),
            hooks: self.hooks,
            default_transport: self.default_transport,
        }
    }
}

impl Relay {
    pub fn builder(config: RelayConfig) -> RelayBuilder {
        let mut registry = ConnectionRegistry::new();
        for connection in &config.connections {
            registry.add_connection(connection.clone());
        }
        RelayBuilder {
            config,
            registry,
            log: None,
            hooks: Hooks::new(),
            default_transport: None,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Pick the connections for a send.
    ///
    /// An override beats the configured default; the default-connection filters see the
    /// result. With no id at all, the first configured connection is used. An id that names
    /// no connection resolves nothing.
    pub fn resolve_route(&self, connection: Option<&ConnectionId>) -> Option<Route> {
        self.hooks.run_before_settings();

        let requested = connection
            .cloned()
            .or_else(|| self.config.default_connection.clone());
        let primary = match self.hooks.filter_default(requested) {
            Some(id) if !id.as_str().is_empty() => {
                let found = self.registry.connection(&id).cloned();
                if found.is_none() {
                    tracing::warn!(connection = %id, "Default connection not found");
                }
                found
            }
            _ => self.registry.first_connection().cloned(),
        }?;

        let fallback = self
            .config
            .fallback_connection
            .as_ref()
            .filter(|id| **id != primary.id)
            .and_then(|id| self.registry.connection(id))
            .cloned();

        let route = Route { primary, fallback };
        self.hooks.run_after_settings(&route);
        tracing::debug!(
            primary = %route.primary.id,
            fallback = ?route.fallback.as_ref().map(|c| c.id.as_str()),
            "Resolved route"
        );
        Some(route)
    }

    /// Send through the configured route.
    pub async fn deliver(&self, email: &Email) -> Result<Dispatch, RelayError> {
        self.deliver_with(email, &SendOptions::default()).await
    }

    /// Send with per-call overrides.
    ///
    /// Fails only when an interceptor blocks the mail, or when no connection resolves and
    /// no default transport is installed. Provider failures are reported in the returned
    /// [`Dispatch`].
    pub async fn deliver_with(
        &self,
        email: &Email,
        options: &SendOptions,
    ) -> Result<Dispatch, RelayError> {
        let email = self.hooks.intercept(email.clone())?;

        let Some(route) = self.resolve_route(options.connection.as_ref()) else {
            return self.deliver_default(&email).await;
        };

        let span = tracing::info_span!(
            "mailroute.deliver",
            connection = %route.primary.id,
            to = ?email.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            subject = %email.subject,
        );

        async {
            let primary = self
                .attempt(Stage::Primary, route.primary.clone(), &email, options)
                .await;
            let mut delivered = primary.result.is_success();
            let mut attempts = vec![primary];

            if !delivered {
                if let Some(fallback) = &route.fallback {
                    tracing::warn!(
                        primary = %route.primary.id,
                        fallback = %fallback.id,
                        "Primary connection failed, trying fallback"
                    );
                    let attempt = self
                        .attempt(Stage::Fallback, fallback.clone(), &email, options)
                        .await;
                    delivered = attempt.result.is_success();
                    attempts.push(attempt);
                }
            }

            if delivered {
                tracing::info!(attempts = attempts.len(), "Email delivered");
            } else {
                tracing::error!(attempts = attempts.len(), "Email delivery failed");
            }

            Ok(Dispatch {
                delivered,
                attempts,
                via_default_transport: false,
            })
        }
        .instrument(span)
        .await
    }

    async fn deliver_default(&self, email: &Email) -> Result<Dispatch, RelayError> {
        let transport = self
            .default_transport
            .as_ref()
            .ok_or(RelayError::NotConfigured)?;
        tracing::debug!("No connection resolved, using default transport");
        let delivered = transport.send(email).await;
        Ok(Dispatch {
            delivered,
            attempts: Vec::new(),
            via_default_transport: true,
        })
    }

    async fn attempt(
        &self,
        stage: Stage,
        connection: Connection,
        email: &Email,
        options: &SendOptions,
    ) -> Attempt {
        let connection_id = connection.id.clone();
        let mailer = connection.mailer.clone();
        let provider: Arc<dyn Provider> = match self.registry.provider_for(&connection) {
            Some(provider) => provider,
            None => {
                tracing::warn!(connection = %connection_id, provider = %mailer, "Provider not registered");
                Arc::new(Unregistered {
                    mailer: mailer.clone(),
                })
            }
        };

        let process = Process::initialize(provider, connection, email);

        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = match process.send().await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(connection = %connection_id, error = %e, "Attempt failed before sending");
                DeliveryResult::from_error(&e)
            }
        };

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            metrics::counter!(
                "mailroute_attempts_total",
                "provider" => mailer.clone(),
                "stage" => stage.as_str(),
                "status" => result.status.as_str()
            )
            .increment(1);
            metrics::histogram!("mailroute_attempt_duration_seconds", "provider" => mailer.clone())
                .record(duration);
        }

        if !result.is_success() {
            tracing::warn!(
                connection = %connection_id,
                stage = stage.as_str(),
                response = %result.response,
                "Delivery attempt failed"
            );
        }

        let log_id = match process
            .log_result(&result, &self.log, &self.hooks, options.log_gate.as_deref())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(connection = %connection_id, error = %e, "Failed to write email log");
                None
            }
        };

        Attempt {
            stage,
            connection_id,
            provider: mailer,
            result,
            log_id,
        }
    }

    /// Apply the configured retention to the audit log.
    pub async fn purge_expired_logs(&self, now: DateTime<Utc>) -> Result<u64, RelayError> {
        match self.config.log_retention_days {
            Some(days) if days > 0 => self.log.purge_older_than_days(days, now).await,
            _ => Ok(0),
        }
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .field("default_transport", &self.default_transport.is_some())
            .finish()
    }
}
