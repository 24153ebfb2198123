//! Mailbox address: an email with an optional display name.

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RelayError;

/// An email address with an optional display name.
///
/// Every recipient list of a [`Message`](crate::Message) is an ordered list of these.
///
/// ```
/// use mailroute::Address;
///
/// let addr: Address = ("Alice", "alice@example.com").into();
/// assert_eq!(addr.formatted(), "Alice <alice@example.com>");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Alice Smith")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address (e.g., "alice@example.com")
    pub email: String,
}

impl Address {
    /// Create an address with just an email.
    ///
    /// No validation happens here; a warning is emitted for values that do not even
    /// contain an `@`. Use [`Address::parse`] for strict validation.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        if !email.contains('@') {
            tracing::warn!(email = %email, "Address without '@'");
        }
        Self { name: None, email }
    }

    /// Create an address with a display name. An empty name is stored as no name.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        let mut addr = Self::new(email);
        if !name.is_empty() {
            addr.name = Some(name);
        }
        addr
    }

    /// Parse and validate an email address (RFC 5321/5322).
    ///
    /// ```
    /// use mailroute::Address;
    ///
    /// assert!(Address::parse("user@example.com").is_ok());
    /// assert!(Address::parse("not-an-email").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, RelayError> {
        if !is_valid_email(email) {
            return Err(RelayError::InvalidAddress(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
        Ok(Self {
            name: None,
            email: email.to_string(),
        })
    }

    /// Whether the email part is a well-formed address.
    pub fn is_valid(&self) -> bool {
        is_valid_email(&self.email)
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.email),
            _ => self.email.clone(),
        }
    }
}

/// Whether `email` is a syntactically valid address.
pub fn is_valid_email(email: &str) -> bool {
    EmailAddress::is_valid(email)
}

/// Join addresses into a single comma-separated header value, skipping empty emails.
pub fn format_list(addresses: &[Address]) -> String {
    addresses
        .iter()
        .filter(|a| !a.email.is_empty())
        .map(Address::formatted)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

impl From<(String, String)> for Address {
    fn from((name, email): (String, String)) -> Self {
        Self::with_name(name, email)
    }
}

/// Conversion into an [`Address`], so host types can be used directly as recipients.
///
/// ```
/// use mailroute::{Address, Email, ToAddress};
///
/// struct Customer {
///     name: String,
///     email: String,
/// }
///
/// impl ToAddress for Customer {
///     fn to_address(&self) -> Address {
///         Address::with_name(&self.name, &self.email)
///     }
/// }
///
/// let customer = Customer { name: "Ada".into(), email: "ada@example.com".into() };
/// let email = Email::new().to(&customer);
/// assert_eq!(email.to[0].email, "ada@example.com");
/// ```
pub trait ToAddress {
    fn to_address(&self) -> Address;
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl<N: AsRef<str>, E: AsRef<str>> ToAddress for (N, E) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0.as_ref(), self.1.as_ref())
    }
}
