//! Normalized outbound message.
//!
//! [`Message::extract`] reads a host [`OutgoingMail`] through a [`Connection`] and produces
//! the provider-neutral form every [`Provider`](crate::Provider) consumes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::Address;
use crate::attachment::Attachment;
use crate::connection::Connection;
use crate::email::OutgoingMail;

const RETURN_PATH: &str = "Return-Path";

/// Headers describing the body; the body representation carries them instead.
const BODY_HEADERS: &[&str] = &["Content-Type", "MIME-Version"];

/// Message body. Exactly one representation is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    /// Plain text only.
    Text { text: String },
    /// HTML with a plain text alternative (possibly empty).
    Html { text: String, html: String },
}

impl Body {
    /// The representation stored in the audit log: HTML when present, otherwise text.
    pub fn primary(&self) -> &str {
        match self {
            Body::Text { text } => text,
            Body::Html { html, text } if html.is_empty() => text,
            Body::Html { html, .. } => html,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Body::Text { text } | Body::Html { text, .. } => text,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            Body::Text { .. } => None,
            Body::Html { html, .. } => Some(html),
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Body::Html { .. })
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Text {
            text: String::new(),
        }
    }
}

/// The normalized outbound email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Effective sender after connection overrides.
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub subject: String,
    pub body: Body,
    /// Custom headers. Keys are case-sensitive; the last value written wins.
    pub headers: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_path: Option<String>,
}

impl Message {
    /// Build the normalized message for sending `mail` through `connection`.
    ///
    /// The sender is resolved through the connection's forced overrides. `Return-Path`
    /// headers go to [`Message::return_path`] instead of the header map; without one, the
    /// host's own sender address is used.
    pub fn extract(mail: &dyn OutgoingMail, connection: &Connection) -> Self {
        let original_from = mail.sender();
        let from_email = connection.resolve_from_email(original_from.map(|a| a.email.as_str()));
        let from_name =
            connection.resolve_from_name(original_from.and_then(|a| a.name.as_deref()));

        let mut message = Message {
            from: Address::with_name(from_name, from_email),
            to: mail.to_addresses().to_vec(),
            cc: mail.cc_addresses().to_vec(),
            bcc: mail.bcc_addresses().to_vec(),
            reply_to: mail.reply_to_addresses().to_vec(),
            subject: mail.subject_line().to_string(),
            body: Body::default(),
            headers: BTreeMap::new(),
            attachments: mail.attached_files().to_vec(),
            return_path: original_from.map(|a| a.email.clone()),
        };

        for (name, value) in mail.custom_headers() {
            message.set_header(name, value);
        }

        let text = mail.text_part().unwrap_or_default().to_string();
        message.body = match mail.html_part() {
            Some(html) => Body::Html {
                text,
                html: html.to_string(),
            },
            None => Body::Text { text },
        };

        message
    }

    /// Set a custom header.
    ///
    /// Empty names or values are ignored and `Return-Path` is diverted to the return path.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = name.trim();
        if name.is_empty() || value.is_empty() {
            return;
        }
        if name.eq_ignore_ascii_case(RETURN_PATH) {
            self.return_path = Some(value.trim().to_string());
            return;
        }
        if BODY_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return;
        }
        self.headers.insert(name.to_string(), value.to_string());
    }
}
