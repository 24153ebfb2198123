//! Extension points invoked at fixed pipeline checkpoints.
//!
//! | Checkpoint | Registered with | Can |
//! |------------|-----------------|-----|
//! | before the route is read | [`Hooks::on_before_settings`] | observe |
//! | default connection chosen | [`Hooks::filter_default_connection`] | replace the id |
//! | route resolved | [`Hooks::on_after_settings`] | observe |
//! | before dispatch | [`Hooks::interceptor`] | transform or block the mail |
//! | before a log write | [`Hooks::filter_log_context`] | transform the snapshot |
//! | before a log write | [`Hooks::log_gate`] | suppress the write |
//! | after a failed attempt | [`Hooks::on_failure`] | observe |
//!
//! # Example
//!
//! ```
//! use mailroute::{Email, Hooks, RelayError};
//!
//! let hooks = Hooks::new()
//!     .interceptor(|email: Email| -> Result<Email, RelayError> {
//!         Ok(email.header("X-Relay", "mailroute"))
//!     })
//!     .on_failure(|failure: &mailroute::FailedDelivery| {
//!         eprintln!("delivery via {} failed", failure.connection_id);
//!     });
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::address::Address;
use crate::connection::ConnectionId;
use crate::dispatch::Route;
use crate::email::Email;
use crate::error::RelayError;
use crate::log::EmailLogContext;

/// Transforms or blocks mail before it is dispatched.
///
/// Return `Err(...)` to block the email; nothing is sent and nothing is logged.
///
/// For complex logic, implement the trait on a struct:
///
/// ```
/// use mailroute::{Email, Interceptor, RelayError};
///
/// struct TenantBranding { tenant_id: String }
///
/// impl Interceptor for TenantBranding {
///     fn intercept(&self, email: Email) -> Result<Email, RelayError> {
///         Ok(email.header("X-Tenant-ID", self.tenant_id.as_str()))
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync {
    fn intercept(&self, email: Email) -> Result<Email, RelayError>;
}

impl<F> Interceptor for F
where
    F: Fn(Email) -> Result<Email, RelayError> + Send + Sync,
{
    fn intercept(&self, email: Email) -> Result<Email, RelayError> {
        (self)(email)
    }
}

/// Decides whether a log write is suppressed. Returning `true` skips persistence.
pub trait LogGate: Send + Sync {
    fn suppress(&self, context: &EmailLogContext) -> bool;
}

impl<F> LogGate for F
where
    F: Fn(&EmailLogContext) -> bool + Send + Sync,
{
    fn suppress(&self, context: &EmailLogContext) -> bool {
        (self)(context)
    }
}

/// Details handed to failure observers.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDelivery {
    pub connection_id: ConnectionId,
    pub provider: String,
    pub to: Vec<Address>,
    pub subject: String,
    pub response: Value,
}

/// Notified synchronously after every failed attempt, before the attempt is logged.
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, failure: &FailedDelivery);
}

impl<F> FailureObserver for F
where
    F: Fn(&FailedDelivery) + Send + Sync,
{
    fn on_failure(&self, failure: &FailedDelivery) {
        (self)(failure)
    }
}

type SettingsObserver = Arc<dyn Fn() + Send + Sync>;
type ConnectionFilter = Arc<dyn Fn(Option<ConnectionId>) -> Option<ConnectionId> + Send + Sync>;
type RouteObserver = Arc<dyn Fn(&Route) + Send + Sync>;
type ContextFilter = Arc<dyn Fn(EmailLogContext) -> EmailLogContext + Send + Sync>;

/// Registered hooks, run in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    before_settings: Vec<SettingsObserver>,
    default_connection: Vec<ConnectionFilter>,
    after_settings: Vec<RouteObserver>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    context_filters: Vec<ContextFilter>,
    log_gates: Vec<Arc<dyn LogGate>>,
    failure_observers: Vec<Arc<dyn FailureObserver>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_settings<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before_settings.push(Arc::new(f));
        self
    }

    /// Each filter receives the previous filter's output.
    pub fn filter_default_connection<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<ConnectionId>) -> Option<ConnectionId> + Send + Sync + 'static,
    {
        self.default_connection.push(Arc::new(f));
        self
    }

    pub fn on_after_settings<F>(mut self, f: F) -> Self
    where
        F: Fn(&Route) + Send + Sync + 'static,
    {
        self.after_settings.push(Arc::new(f));
        self
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Rewrite the snapshot before it is gated and stored. Filters run in registration
    /// order, after failure observers. Resend reads back whatever was stored.
    pub fn filter_log_context<F>(mut self, f: F) -> Self
    where
        F: Fn(EmailLogContext) -> EmailLogContext + Send + Sync + 'static,
    {
        self.context_filters.push(Arc::new(f));
        self
    }

    pub fn log_gate(mut self, gate: impl LogGate + 'static) -> Self {
        self.log_gates.push(Arc::new(gate));
        self
    }

    pub fn on_failure(mut self, observer: impl FailureObserver + 'static) -> Self {
        self.failure_observers.push(Arc::new(observer));
        self
    }

    pub(crate) fn run_before_settings(&self) {
        for hook in &self.before_settings {
            hook();
        }
    }

    pub(crate) fn filter_default(&self, id: Option<ConnectionId>) -> Option<ConnectionId> {
        self.default_connection
            .iter()
            .fold(id, |current, filter| filter(current))
    }

    pub(crate) fn run_after_settings(&self, route: &Route) {
        for hook in &self.after_settings {
            hook(route);
        }
    }

    pub(crate) fn intercept(&self, email: Email) -> Result<Email, RelayError> {
        self.interceptors
            .iter()
            .try_fold(email, |email, interceptor| interceptor.intercept(email))
    }

    pub(crate) fn apply_context_filters(&self, context: EmailLogContext) -> EmailLogContext {
        self.context_filters
            .iter()
            .fold(context, |context, filter| filter(context))
    }

    /// True if any gate asks for suppression. Every gate is consulted.
    pub(crate) fn suppress_log(&self, context: &EmailLogContext) -> bool {
        self.log_gates
            .iter()
            .fold(false, |suppressed, gate| gate.suppress(context) || suppressed)
    }

    pub(crate) fn notify_failure(&self, failure: &FailedDelivery) {
        for observer in &self.failure_observers {
            observer.on_failure(failure);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_settings", &self.before_settings.len())
            .field("default_connection", &self.default_connection.len())
            .field("after_settings", &self.after_settings.len())
            .field("interceptors", &self.interceptors.len())
            .field("context_filters", &self.context_filters.len())
            .field("log_gates", &self.log_gates.len())
            .field("failure_observers", &self.failure_observers.len())
            .finish()
    }
}
