//! Local adapter tests.

use mailroute::providers::LocalProvider;
use mailroute::{Connection, Email, Process, Provider, RelayError};
use std::sync::Arc;

fn valid_email() -> Email {
    Email::new()
        .from("tony.stark@example.com")
        .to("steve.rogers@example.com")
        .subject("Hello, Avengers!")
        .text_body("Hello!")
}

fn process(local: &LocalProvider, connection: Connection, email: &Email) -> Process {
    Process::initialize(Arc::new(local.clone()), connection, email)
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn send_returns_succeeded() {
    let local = LocalProvider::new();
    let result = process(&local, Connection::new("main", "local"), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.message_id.is_some());
    assert_eq!(result.response["id"], result.message_id.clone().unwrap().as_str());
}

#[tokio::test]
async fn captures_sent_emails() {
    let local = LocalProvider::new();
    process(&local, Connection::new("main", "local"), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(local.has_emails());
    assert_eq!(local.email_count(), 1);
    assert!(local.sent_to("steve.rogers@example.com"));
    assert!(local.sent_with_subject("Hello, Avengers!"));
    assert_eq!(local.last_email().unwrap().connection_id.as_str(), "main");
}

#[tokio::test]
async fn can_flush_emails() {
    let local = LocalProvider::new();
    for subject in ["Test 1", "Test 2"] {
        process(
            &local,
            Connection::new("main", "local"),
            &valid_email().subject(subject),
        )
        .send()
        .await
        .unwrap();
    }

    let flushed = local.flush();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].message.subject, "Test 2");
    assert_eq!(local.email_count(), 0);
}

// ============================================================================
// Connection Overrides
// ============================================================================

#[tokio::test]
async fn forced_sender_replaces_original() {
    let local = LocalProvider::new();
    let connection = Connection::new("main", "local")
        .from_email("noreply@shield.example.com", true)
        .from_name("S.H.I.E.L.D.", true);

    process(&local, connection, &valid_email()).send().await.unwrap();

    let sent = local.last_email().unwrap().message;
    assert_eq!(sent.from.email, "noreply@shield.example.com");
    assert_eq!(sent.from.name.as_deref(), Some("S.H.I.E.L.D."));
    assert_eq!(sent.return_path.as_deref(), Some("tony.stark@example.com"));
}

#[tokio::test]
async fn unforced_sender_keeps_original() {
    let local = LocalProvider::new();
    let connection = Connection::new("main", "local").from_email("noreply@shield.example.com", false);

    process(&local, connection, &valid_email()).send().await.unwrap();

    assert_eq!(
        local.last_email().unwrap().message.from.email,
        "tony.stark@example.com"
    );
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn simulated_failure_is_a_failed_result() {
    let local = LocalProvider::new();
    local.set_failure("421 try again later");

    let result = process(&local, Connection::new("main", "local"), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.response["error"], "421 try again later");
    assert_eq!(local.email_count(), 0);
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error() {
    let local = LocalProvider::with_slug("smtp").require_credentials(&["host", "password"]);
    let connection = Connection::new("main", "smtp").credential("host", "smtp.example.com");

    let err = process(&local, connection, &valid_email())
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Configuration(ref msg) if msg.contains("password")));
    assert!(!err.is_recoverable());
    assert_eq!(local.email_count(), 0);
}

#[test]
fn provider_metadata() {
    let local = LocalProvider::new();
    assert_eq!(local.slug(), "local");
    assert_eq!(local.name(), "Local");
    assert!(local.required_credentials().is_empty());
}
