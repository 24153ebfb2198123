//! Host-side outgoing mail object and the trait the extraction step reads from.

use serde::{Deserialize, Serialize};

use crate::address::{Address, ToAddress};
use crate::attachment::Attachment;

/// Read access to whatever mail object the host application hands to the relay.
///
/// [`Message::extract`](crate::Message::extract) only talks to this trait, so a host
/// with its own mail type implements it instead of converting into [`Email`].
pub trait OutgoingMail: Send + Sync {
    /// Sender as set by the host, before any connection override.
    fn sender(&self) -> Option<&Address>;
    fn to_addresses(&self) -> &[Address];
    fn cc_addresses(&self) -> &[Address];
    fn bcc_addresses(&self) -> &[Address];
    fn reply_to_addresses(&self) -> &[Address];
    fn subject_line(&self) -> &str;
    fn text_part(&self) -> Option<&str>;
    fn html_part(&self) -> Option<&str>;
    /// Custom headers in the order they were added. Duplicates are allowed here.
    fn custom_headers(&self) -> &[(String, String)];
    fn attached_files(&self) -> &[Attachment];
}

/// An outgoing email, built the way host code composes mail.
///
/// ```
/// use mailroute::Email;
///
/// let email = Email::new()
///     .from(("Shop", "shop@example.com"))
///     .to("customer@example.com")
///     .subject("Your order")
///     .text_body("Thanks!")
///     .header("X-Order-Id", "1042");
/// assert!(email.is_valid());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Carbon copy recipients
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients
    pub bcc: Vec<Address>,
    /// Reply-to addresses
    pub reply_to: Vec<Address>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// File attachments
    pub attachments: Vec<Attachment>,
    /// Custom headers, in insertion order
    pub headers: Vec<(String, String)>,
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to.push(addr.to_address());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.push(addr.to_address());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.push(addr.to_address());
        self
    }

    /// Add a reply-to address.
    pub fn reply_to(mut self, addr: impl ToAddress) -> Self {
        self.reply_to.push(addr.to_address());
        self
    }

    /// Replace all recipients.
    pub fn put_to(mut self, addrs: Vec<Address>) -> Self {
        self.to = addrs;
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Add an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Append a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Last value set for a header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if the email has the fields every provider needs.
    pub fn is_valid(&self) -> bool {
        self.from.is_some() && !self.to.is_empty()
    }
}

impl OutgoingMail for Email {
    fn sender(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    fn to_addresses(&self) -> &[Address] {
        &self.to
    }

    fn cc_addresses(&self) -> &[Address] {
        &self.cc
    }

    fn bcc_addresses(&self) -> &[Address] {
        &self.bcc
    }

    fn reply_to_addresses(&self) -> &[Address] {
        &self.reply_to
    }

    fn subject_line(&self) -> &str {
        &self.subject
    }

    fn text_part(&self) -> Option<&str> {
        self.text_body.as_deref()
    }

    fn html_part(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    fn custom_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn attached_files(&self) -> &[Attachment] {
        &self.attachments
    }
}
