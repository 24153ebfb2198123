//! Webhook adapter tests.

use mailroute::providers::WebhookProvider;
use mailroute::{Attachment, Connection, Email, Process, RelayError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_email() -> Email {
    Email::new()
        .from("tony.stark@example.com")
        .to("steve.rogers@example.com")
        .subject("Hello, Avengers!")
        .html_body("<h1>Hello</h1>")
        .text_body("Hello")
}

fn connection(server: &MockServer) -> Connection {
    Connection::new("internal", "webhook").credential("endpoint", format!("{}/send", server.uri()))
}

fn process(provider: WebhookProvider, connection: Connection, email: &Email) -> Process {
    Process::initialize(Arc::new(provider), connection, email)
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_succeeded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "from": "tony.stark@example.com",
            "to": ["steve.rogers@example.com"],
            "subject": "Hello, Avengers!",
            "text": "Hello",
            "html": "<h1>Hello</h1>",
            "return_path": "tony.stark@example.com"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = process(WebhookProvider::new(), connection(&server), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.message_id.as_deref(), Some("msg-42"));
    assert_eq!(result.response, json!({"id": "msg-42"}));
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("Authorization", "Bearer wh_123456789"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server).credential("api_key", "wh_123456789");
    let result = process(WebhookProvider::new(), conn, &valid_email())
        .send()
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.message_id.is_none());
}

#[tokio::test]
async fn all_fields_are_posted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_json(json!({
            "from": "Tony Stark <tony.stark@example.com>",
            "to": ["Steve Rogers <steve.rogers@example.com>"],
            "cc": ["natasha.romanoff@example.com"],
            "bcc": ["bruce.banner@example.com"],
            "reply_to": ["office@avengers.example.com"],
            "subject": "Hello, Avengers!",
            "text": "Hello",
            "headers": {"X-Mission": "assemble"},
            "return_path": "bounce@avengers.example.com",
            "attachments": [{
                "filename": "plan.txt",
                "content_type": "text/plain",
                "content": "YXNzZW1ibGU="
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let email = Email::new()
        .from(("Tony Stark", "tony.stark@example.com"))
        .to(("Steve Rogers", "steve.rogers@example.com"))
        .cc("natasha.romanoff@example.com")
        .bcc("bruce.banner@example.com")
        .reply_to("office@avengers.example.com")
        .subject("Hello, Avengers!")
        .text_body("Hello")
        .header("X-Mission", "assemble")
        .header("Return-Path", "bounce@avengers.example.com")
        .attachment(Attachment::from_bytes("plan.txt", b"assemble".to_vec()));

    let result = process(WebhookProvider::new(), connection(&server), &email)
        .send()
        .await
        .unwrap();
    assert!(result.is_success());
}

// ============================================================================
// Error Handling
// ============================================================================

#[tokio::test]
async fn rejection_is_a_failed_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid recipient"})),
        )
        .mount(&server)
        .await;

    let result = process(WebhookProvider::new(), connection(&server), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.response["status"], 422);
    assert_eq!(result.response["body"]["message"], "Invalid recipient");
}

#[tokio::test]
async fn non_json_error_body_is_kept_as_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let result = process(WebhookProvider::new(), connection(&server), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.response["body"], "upstream unavailable");
}

#[tokio::test]
async fn timeout_is_a_failed_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let provider = WebhookProvider::new().timeout(Duration::from_millis(100));
    let result = process(provider, connection(&server), &valid_email())
        .send()
        .await
        .unwrap();

    assert!(!result.is_success());
    assert!(result.response["error"]
        .as_str()
        .unwrap()
        .starts_with("HTTP error"));
}

#[tokio::test]
async fn missing_endpoint_is_a_configuration_error() {
    let err = process(
        WebhookProvider::new(),
        Connection::new("internal", "webhook"),
        &valid_email(),
    )
    .send()
    .await
    .unwrap_err();

    assert!(matches!(err, RelayError::Configuration(ref msg) if msg.contains("endpoint")));
}
