//! Generic JSON-over-HTTP provider.
//!
//! Posts the normalized message to the connection's `endpoint` credential. Useful for
//! in-house mail services and for bridging to providers without a dedicated adapter.
//!
//! # Connection credentials
//!
//! | Key | Required | Description |
//! |-----|----------|-------------|
//! | `endpoint` | yes | URL the message is POSTed to |
//! | `api_key` | no | Sent as `Authorization: Bearer <api_key>` |
//!
//! # Example
//!
//! ```rust,ignore
//! use mailroute::providers::WebhookProvider;
//!
//! let relay = Relay::builder(
//!     RelayConfig::new().connection(
//!         Connection::new("internal", "webhook")
//!             .credential("endpoint", "https://mail.internal/send")
//!             .credential("api_key", "secret"),
//!     ),
//! )
//! .provider(WebhookProvider::new())
//! .build();
//! ```
//!
//! # Response handling
//!
//! A 2xx response is a success; its JSON body (or raw text) becomes the logged response and
//! a string `id` field becomes the message id. Any other status is a failed result carrying
//! the status code and body.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::connection::Connection;
use crate::error::RelayError;
use crate::message::Message;
use crate::process::{DeliveryResult, Provider};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts each message as JSON to a configured endpoint.
pub struct WebhookProvider {
    client: Client,
    timeout: Duration,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound for each request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request<'a>(&self, message: &'a Message) -> Result<WebhookRequest<'a>, RelayError> {
        if message.to.is_empty() {
            return Err(RelayError::MissingField("to"));
        }

        let attachments = message
            .attachments
            .iter()
            .map(|a| {
                Ok(WebhookAttachment {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    content: a.base64_data()?,
                })
            })
            .collect::<Result<Vec<_>, RelayError>>()?;

        Ok(WebhookRequest {
            from: message.from.formatted(),
            to: message.to.iter().map(|a| a.formatted()).collect(),
            cc: message.cc.iter().map(|a| a.formatted()).collect(),
            bcc: message.bcc.iter().map(|a| a.formatted()).collect(),
            reply_to: message.reply_to.iter().map(|a| a.formatted()).collect(),
            subject: &message.subject,
            text: message.body.text(),
            html: message.body.html(),
            headers: &message.headers,
            return_path: message.return_path.as_deref(),
            attachments,
        })
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    fn slug(&self) -> &str {
        "webhook"
    }

    fn name(&self) -> &str {
        "Webhook"
    }

    fn required_credentials(&self) -> &[&'static str] {
        &["endpoint"]
    }

    async fn send(
        &self,
        message: &Message,
        connection: &Connection,
    ) -> Result<DeliveryResult, RelayError> {
        let endpoint = connection.credential_value("endpoint")?;
        let request = self.build_request(message)?;

        let mut req = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("User-Agent", format!("mailroute/{}", crate::VERSION));
        if let Ok(api_key) = connection.credential_value("api_key") {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.json(&request).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            let message_id = body.get("id").and_then(Value::as_str).map(str::to_string);
            let result = DeliveryResult::succeeded(body);
            Ok(match message_id {
                Some(id) => result.with_message_id(id),
                None => result,
            })
        } else {
            tracing::debug!(
                connection = %connection.id,
                status = status.as_u16(),
                "Webhook rejected message"
            );
            Ok(DeliveryResult::failed(json!({
                "status": status.as_u16(),
                "body": body,
            })))
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    from: String,
    to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reply_to: Vec<String>,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<WebhookAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct WebhookAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: String, // Base64 encoded
}
