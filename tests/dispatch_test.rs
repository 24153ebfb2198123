//! Dispatch pipeline tests: routing, fallback, hooks and logging of each attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailroute::log::{LogRow, LogStore};
use mailroute::providers::LocalProvider;
use mailroute::testing::*;
use mailroute::{
    AuditLog, Connection, ConnectionId, DefaultTransport, DeliveryStatus, Email, FailedDelivery,
    Hooks, LogFilter, LogLevel, LogQuery, Relay, RelayConfig, RelayError, Route, SendOptions,
    Stage,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn email() -> Email {
    Email::new()
        .from("shop@example.com")
        .to("customer@example.com")
        .subject("Order #1042")
        .text_body("Thanks for your order")
}

/// Two connections on two providers: `primary` (tag `api`) and `backup` (tag `relay`).
struct Fixture {
    relay: Relay,
    api: LocalProvider,
    backup: LocalProvider,
}

fn fixture(hooks: Hooks) -> Fixture {
    let api = LocalProvider::with_slug("api");
    let backup = LocalProvider::with_slug("relay");
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("primary", "api"))
            .connection(Connection::new("backup", "relay"))
            .default_connection("primary")
            .fallback_connection("backup"),
    )
    .provider(api.clone())
    .provider(backup.clone())
    .hooks(hooks)
    .build();

    Fixture { relay, api, backup }
}

#[derive(Clone, Default)]
struct CountingTransport {
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl DefaultTransport for CountingTransport {
    async fn send(&self, _email: &Email) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        true
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn primary_success_makes_one_attempt() {
    let f = fixture(Hooks::new());

    let dispatch = f.relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    assert!(!dispatch.via_default_transport);
    assert_eq!(dispatch.attempts.len(), 1);
    assert_eq!(dispatch.attempts[0].stage, Stage::Primary);
    assert_eq!(dispatch.attempts[0].connection_id.as_str(), "primary");
    assert_email_count(&f.api, 1);
    assert_no_emails_sent(&f.backup);
    assert_logged(f.relay.log(), DeliveryStatus::Succeeded, 1).await;
}

#[tokio::test]
async fn primary_failure_runs_fallback_once() {
    let f = fixture(Hooks::new());
    f.api.set_failure("503 unavailable");

    let dispatch = f.relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    let stages: Vec<Stage> = dispatch.attempts.iter().map(|a| a.stage).collect();
    assert_eq!(stages, vec![Stage::Primary, Stage::Fallback]);
    assert_email_count(&f.backup, 1);
    assert_logged(f.relay.log(), DeliveryStatus::Failed, 1).await;
    assert_logged(f.relay.log(), DeliveryStatus::Succeeded, 1).await;

    let failed = f
        .relay
        .log()
        .query(&LogQuery::new(LogFilter::new().level(LogLevel::Error)))
        .await
        .unwrap();
    let context = failed[0].email_context().unwrap();
    assert_eq!(context.connection_id, "primary");
    assert_eq!(context.response["error"], "503 unavailable");
}

#[tokio::test]
async fn both_failing_reports_undelivered() {
    let f = fixture(Hooks::new());
    f.api.set_failure("down");
    f.backup.set_failure("also down");

    let dispatch = f.relay.deliver(&email()).await.unwrap();

    assert!(!dispatch.delivered);
    assert_eq!(dispatch.attempts.len(), 2);
    assert_eq!(
        dispatch.final_result().unwrap().response["error"],
        "also down"
    );
    assert_logged(f.relay.log(), DeliveryStatus::Failed, 2).await;
}

#[tokio::test]
async fn fallback_equal_to_primary_is_skipped() {
    let local = LocalProvider::new();
    local.set_failure("down");
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("only", "local"))
            .default_connection("only")
            .fallback_connection("only"),
    )
    .provider(local.clone())
    .build();

    let dispatch = relay.deliver(&email()).await.unwrap();
    assert!(!dispatch.delivered);
    assert_eq!(dispatch.attempts.len(), 1);
}

#[tokio::test]
async fn first_connection_is_used_without_default() {
    let first = LocalProvider::with_slug("first");
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("one", "first"))
            .connection(Connection::new("two", "second")),
    )
    .provider(first.clone())
    .build();

    relay.deliver(&email()).await.unwrap();
    assert_email_count(&first, 1);
}

#[tokio::test]
async fn send_option_overrides_default_connection() {
    let f = fixture(Hooks::new());

    let dispatch = f
        .relay
        .deliver_with(&email(), &SendOptions::new().connection("backup"))
        .await
        .unwrap();

    assert_eq!(dispatch.attempts[0].connection_id.as_str(), "backup");
    assert_no_emails_sent(&f.api);
    assert_email_count(&f.backup, 1);
}

// ============================================================================
// Misconfiguration
// ============================================================================

#[tokio::test]
async fn unregistered_provider_fails_closed_and_falls_back() {
    let backup = LocalProvider::with_slug("relay");
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("primary", "nonexistent"))
            .connection(Connection::new("backup", "relay"))
            .default_connection("primary")
            .fallback_connection("backup"),
    )
    .provider(backup.clone())
    .build();

    let dispatch = relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    assert!(!dispatch.attempts[0].result.is_success());
    assert_eq!(dispatch.attempts[0].provider, "nonexistent");
    assert!(dispatch.attempts[0].log_id.is_some());
    assert_email_count(&backup, 1);
}

#[tokio::test]
async fn missing_credential_is_logged_as_failed() {
    let api = LocalProvider::with_slug("api").require_credentials(&["api_key"]);
    let relay = Relay::builder(RelayConfig::new().connection(Connection::new("primary", "api")))
        .provider(api.clone())
        .build();

    let dispatch = relay.deliver(&email()).await.unwrap();

    assert!(!dispatch.delivered);
    assert_no_emails_sent(&api);
    let entry = last_log_entry(relay.log()).await;
    assert_eq!(entry.level, LogLevel::Error);
    assert!(entry.context["response"]["error"]
        .as_str()
        .unwrap()
        .contains("api_key"));
}

#[tokio::test]
async fn no_connection_uses_default_transport() {
    let transport = CountingTransport::default();
    let relay = Relay::builder(RelayConfig::new())
        .default_transport(transport.clone())
        .build();

    let dispatch = relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    assert!(dispatch.via_default_transport);
    assert!(dispatch.attempts.is_empty());
    assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    assert_nothing_logged(relay.log()).await;
}

#[tokio::test]
async fn unknown_override_uses_default_transport() {
    let transport = CountingTransport::default();
    let local = LocalProvider::new();
    let relay = Relay::builder(RelayConfig::new().connection(Connection::new("main", "local")))
        .provider(local.clone())
        .default_transport(transport.clone())
        .build();

    let dispatch = relay
        .deliver_with(&email(), &SendOptions::new().connection("gone"))
        .await
        .unwrap();

    assert!(dispatch.via_default_transport);
    assert_no_emails_sent(&local);
}

#[tokio::test]
async fn no_connection_and_no_transport_is_not_configured() {
    let relay = Relay::builder(RelayConfig::new()).build();
    assert!(matches!(
        relay.deliver(&email()).await,
        Err(RelayError::NotConfigured)
    ));
}

// ============================================================================
// Hooks
// ============================================================================

#[tokio::test]
async fn interceptor_transforms_mail() {
    let f = fixture(Hooks::new().interceptor(|email: Email| -> Result<Email, RelayError> {
        Ok(email
            .put_to(vec!["qa@example.com".into()])
            .header("X-Intercepted", "true"))
    }));

    f.relay.deliver(&email()).await.unwrap();

    assert_email_to(&f.api, "qa@example.com");
    refute_email_to(&f.api, "customer@example.com");
    assert_email_header(&f.api, "X-Intercepted", "true");
}

#[tokio::test]
async fn interceptor_can_block() {
    let f = fixture(Hooks::new().interceptor(|_: Email| -> Result<Email, RelayError> {
        Err(RelayError::Blocked("suppressed recipient".into()))
    }));

    let result = f.relay.deliver(&email()).await;

    assert!(matches!(result, Err(RelayError::Blocked(_))));
    assert_no_emails_sent(&f.api);
    assert_nothing_logged(f.relay.log()).await;
}

#[tokio::test]
async fn log_gate_suppresses_writes() {
    let f = fixture(Hooks::new().log_gate(|ctx: &mailroute::log::EmailLogContext| {
        ctx.subject.starts_with("Order")
    }));

    let dispatch = f.relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    assert!(dispatch.attempts[0].log_id.is_none());
    assert_nothing_logged(f.relay.log()).await;

    f.relay
        .deliver(&email().subject("Password reset"))
        .await
        .unwrap();
    assert_logged(f.relay.log(), DeliveryStatus::Succeeded, 1).await;
}

#[tokio::test]
async fn context_filters_rewrite_the_logged_snapshot() {
    let f = fixture(
        Hooks::new()
            .filter_log_context(|mut ctx: mailroute::log::EmailLogContext| {
                ctx.body = "[redacted]".into();
                ctx.headers.insert("X-Audit".into(), "filtered".into());
                ctx
            })
            .log_gate(|ctx: &mailroute::log::EmailLogContext| ctx.body != "[redacted]"),
    );

    f.relay.deliver(&email()).await.unwrap();

    assert_email_body_contains(&f.api, "Thanks for your order");
    let context = last_log_entry(f.relay.log()).await.email_context().unwrap();
    assert_eq!(context.body, "[redacted]");
    assert_eq!(context.headers["X-Audit"], "filtered");
}

#[tokio::test]
async fn per_send_log_gate() {
    let f = fixture(Hooks::new());
    let options = SendOptions::new().log_gate(|_: &mailroute::log::EmailLogContext| true);

    f.relay.deliver_with(&email(), &options).await.unwrap();
    assert_nothing_logged(f.relay.log()).await;
}

#[tokio::test]
async fn failure_observers_see_each_failed_attempt() {
    let seen: Arc<Mutex<Vec<FailedDelivery>>> = Arc::default();
    let sink = seen.clone();
    let f = fixture(Hooks::new().on_failure(move |failure: &FailedDelivery| {
        sink.lock().push(failure.clone());
    }));
    f.api.set_failure("down");

    f.relay.deliver(&email()).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].connection_id.as_str(), "primary");
    assert_eq!(seen[0].provider, "api");
    assert_eq!(seen[0].subject, "Order #1042");
}

#[tokio::test]
async fn settings_hooks_observe_and_filter_route() {
    let before = Arc::new(AtomicUsize::new(0));
    let routes: Arc<Mutex<Vec<Route>>> = Arc::default();
    let (b, r) = (before.clone(), routes.clone());

    let f = fixture(
        Hooks::new()
            .on_before_settings(move || {
                b.fetch_add(1, Ordering::SeqCst);
            })
            .filter_default_connection(|_| Some(ConnectionId::new("backup")))
            .on_after_settings(move |route: &Route| r.lock().push(route.clone())),
    );

    f.relay.deliver(&email()).await.unwrap();

    assert_eq!(before.load(Ordering::SeqCst), 1);
    let routes = routes.lock();
    assert_eq!(routes[0].primary.id.as_str(), "backup");
    assert!(routes[0].fallback.is_none());
    assert_email_count(&f.backup, 1);
}

// ============================================================================
// Logging
// ============================================================================

#[tokio::test]
async fn logged_context_snapshots_the_message() {
    let f = fixture(Hooks::new());
    let mail = email()
        .cc("accounts@example.com")
        .header("X-Order-Id", "1042")
        .header("Return-Path", "bounce@example.com");

    f.relay.deliver(&mail).await.unwrap();

    let entry = last_log_entry(f.relay.log()).await;
    assert_eq!(entry.message, "Order #1042");
    assert_eq!(entry.source, "api");

    let context = entry.email_context().unwrap();
    assert_eq!(context.body, "Thanks for your order");
    assert_eq!(context.recipients.cc[0].email, "accounts@example.com");
    assert_eq!(context.headers["X-Order-Id"], "1042");
    assert_eq!(context.return_path.as_deref(), Some("bounce@example.com"));
    assert_eq!(context.status, DeliveryStatus::Succeeded);
    assert_eq!(context.resend_count, 0);
}

struct BrokenStore;

#[async_trait]
impl LogStore for BrokenStore {
    async fn insert(
        &self,
        _: DateTime<Utc>,
        _: LogLevel,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<i64, RelayError> {
        Err(RelayError::Storage("disk full".into()))
    }
    async fn query(&self, _: &LogQuery) -> Result<Vec<LogRow>, RelayError> {
        Ok(vec![])
    }
    async fn count(&self, _: &LogQuery) -> Result<u64, RelayError> {
        Ok(0)
    }
    async fn get_by_ids(&self, _: &[i64]) -> Result<Vec<LogRow>, RelayError> {
        Ok(vec![])
    }
    async fn update(&self, _: i64, _: LogLevel, _: &str, _: &str) -> Result<bool, RelayError> {
        Ok(false)
    }
    async fn delete_by_ids(&self, _: &[i64]) -> Result<u64, RelayError> {
        Ok(0)
    }
    async fn delete_by_source(&self, _: &str) -> Result<u64, RelayError> {
        Ok(0)
    }
    async fn truncate(&self) -> Result<u64, RelayError> {
        Ok(0)
    }
    async fn delete_older_than(&self, _: DateTime<Utc>) -> Result<u64, RelayError> {
        Ok(0)
    }
}

#[tokio::test]
async fn storage_failure_does_not_change_delivery() {
    let local = LocalProvider::new();
    let relay = Relay::builder(RelayConfig::new().connection(Connection::new("main", "local")))
        .provider(local.clone())
        .log(AuditLog::new(Arc::new(BrokenStore)))
        .build();

    let dispatch = relay.deliver(&email()).await.unwrap();

    assert!(dispatch.delivered);
    assert!(dispatch.attempts[0].log_id.is_none());
    assert_email_count(&local, 1);
}

#[tokio::test]
async fn retention_purge_uses_configured_days() {
    let local = LocalProvider::new();
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("main", "local"))
            .log_retention_days(7),
    )
    .provider(local)
    .build();

    relay.deliver(&email()).await.unwrap();

    let soon = Utc::now() + chrono::Duration::days(1);
    assert_eq!(relay.purge_expired_logs(soon).await.unwrap(), 0);
    let later = Utc::now() + chrono::Duration::days(8);
    assert_eq!(relay.purge_expired_logs(later).await.unwrap(), 1);
    assert_nothing_logged(relay.log()).await;
}

#[tokio::test]
async fn huge_retention_purges_nothing() {
    let local = LocalProvider::new();
    let relay = Relay::builder(
        RelayConfig::new()
            .connection(Connection::new("main", "local"))
            .log_retention_days(100_000_000),
    )
    .provider(local)
    .build();

    relay.deliver(&email()).await.unwrap();

    assert_eq!(relay.purge_expired_logs(Utc::now()).await.unwrap(), 0);
    assert_logged(relay.log(), DeliveryStatus::Succeeded, 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_are_independent() {
    let f = fixture(Hooks::new());
    let relay = Arc::new(f.relay);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let relay = relay.clone();
            tokio::spawn(async move {
                relay
                    .deliver(&email().subject(format!("Order #{i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().delivered);
    }
    assert_email_count(&f.api, 16);
    assert_logged(relay.log(), DeliveryStatus::Succeeded, 16).await;
}
