//! Versioned context encoding and the email delivery snapshot.
//!
//! Every context is persisted inside an envelope:
//!
//! ```json
//! {"schema": 1, "writer": "mailroute/0.1.0", "data": { ... }}
//! ```
//!
//! Readers accept any schema up to [`SCHEMA_VERSION`] and also plain JSON written without
//! an envelope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::address::Address;
use crate::attachment::Attachment;
use crate::error::RelayError;
use crate::process::DeliveryStatus;

pub const SCHEMA_VERSION: u64 = 1;

/// Serialize a context value into its stored envelope form.
pub fn encode(data: &Value) -> Result<String, RelayError> {
    let envelope = json!({
        "schema": SCHEMA_VERSION,
        "writer": format!("mailroute/{}", crate::VERSION),
        "data": data,
    });
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a stored context back into the value originally encoded.
pub fn decode(raw: &str) -> Result<Value, RelayError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(raw)?;
    let schema = value.get("schema").and_then(Value::as_u64);
    match (schema, value.get("data")) {
        (Some(schema), Some(_)) if schema > SCHEMA_VERSION => Err(RelayError::Storage(format!(
            "context schema {} is newer than supported {}",
            schema, SCHEMA_VERSION
        ))),
        (Some(_), Some(data)) => Ok(data.clone()),
        _ => Ok(value),
    }
}

/// The part of a stored context that search runs over: the envelope's `data`, or the
/// raw text when there is no envelope. Envelope fields never match.
pub(crate) fn search_text(raw: &str) -> Cow<'_, str> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Cow::Borrowed(raw);
    };
    match (value.get("schema").and_then(Value::as_u64), value.get("data")) {
        (Some(_), Some(Value::Null)) => Cow::Borrowed(""),
        (Some(_), Some(Value::String(text))) => Cow::Owned(text.clone()),
        (Some(_), Some(data)) => Cow::Owned(data.to_string()),
        _ => Cow::Borrowed(raw),
    }
}

/// Recipients grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    #[serde(default)]
    pub reply_to: Vec<Address>,
}

/// What is kept of an attachment. Inline bytes are not persisted, only file references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub filename: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&Attachment> for AttachmentRecord {
    fn from(attachment: &Attachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            path: attachment.path.clone(),
        }
    }
}

/// Snapshot of one delivery attempt, enough to rebuild and resend the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLogContext {
    pub subject: String,
    /// HTML body when one was present, otherwise the plain text.
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    pub from: Address,
    #[serde(default)]
    pub recipients: Recipients,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_path: Option<String>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub response: Value,
    /// Provider slug.
    pub provider: String,
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub resend_count: u32,
}

impl EmailLogContext {
    pub fn to_value(&self) -> Result<Value, RelayError> {
        Ok(serde_json::to_value(self)?)
    }
}
