//! Logger adapter tests.

use mailroute::providers::LoggerProvider;
use mailroute::{Connection, Email, Process};
use std::sync::Arc;

fn valid_email() -> Email {
    Email::new()
        .from("tony.stark@example.com")
        .to("steve.rogers@example.com")
        .subject("Hello, Avengers!")
        .html_body("<h1>Hello</h1>")
        .text_body("Hello")
}

#[tokio::test]
async fn send_returns_succeeded() {
    let process = Process::initialize(
        Arc::new(LoggerProvider::new()),
        Connection::new("staging", "logger"),
        &valid_email(),
    );

    let result = process.send().await.unwrap();
    assert!(result.is_success());
    assert!(result.message_id.is_some());
    assert_eq!(process.provider_slug(), "logger");
}

#[tokio::test]
async fn full_mode_returns_succeeded() {
    let process = Process::initialize(
        Arc::new(LoggerProvider::full()),
        Connection::new("staging", "logger"),
        &valid_email().cc("natasha.romanoff@example.com"),
    );

    let result = process.send().await.unwrap();
    assert_eq!(result.response["logged"], true);
}

#[tokio::test]
async fn each_send_gets_a_new_message_id() {
    let provider = Arc::new(LoggerProvider::new());
    let conn = Connection::new("staging", "logger");

    let first = Process::initialize(provider.clone(), conn.clone(), &valid_email())
        .send()
        .await
        .unwrap();
    let second = Process::initialize(provider, conn, &valid_email())
        .send()
        .await
        .unwrap();

    assert_ne!(first.message_id, second.message_id);
}
