//! Outbound message model.
//!
//! Senders only ever see a fully built [`Message`]. Callers that want a
//! message produced lazily hand a compose function to the dispatcher, which
//! applies it to a [`MessageBuilder`] obtained from each sender in turn.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while turning a [`MessageBuilder`] into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// A required field was never set.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// No `to`, `cc` or `bcc` recipient was given.
    #[error("Message has no recipients")]
    NoRecipients,

    /// An address could not be parsed as a single mailbox.
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A header name or value would corrupt the message.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// A single mailbox, optionally with a display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub addr: String,
}

impl Address {
    /// Parse `input` as exactly one mailbox, e.g. `"Jo <jo@example.com>"`.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::InvalidAddress`] for groups, lists, and anything
    /// without a local part and a domain.
    pub fn parse(input: &str) -> Result<Self, ComposeError> {
        let invalid = |reason: &str| ComposeError::InvalidAddress {
            address: input.to_string(),
            reason: reason.to_string(),
        };

        let parsed = mailparse::addrparse(input).map_err(|e| invalid(&e.to_string()))?;

        let single = match parsed.as_slice() {
            [mailparse::MailAddr::Single(single)] => single,
            [mailparse::MailAddr::Group(_)] => return Err(invalid("groups are not supported")),
            [] => return Err(invalid("empty address")),
            _ => return Err(invalid("expected a single mailbox")),
        };

        match single.addr.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self {
                display_name: single.display_name.clone(),
                addr: single.addr.clone(),
            }),
            _ => Err(invalid("missing local part or domain")),
        }
    }

    /// The domain half of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.addr
            .rsplit_once('@')
            .map_or(self.addr.as_str(), |(_, domain)| domain)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{name} <{}>", self.addr),
            None => f.write_str(&self.addr),
        }
    }
}

/// A fully built message, ready to be handed to a sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    from: Address,
    reply_to: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: String,
    text_body: Option<String>,
    html_body: Option<String>,
    headers: Vec<(String, String)>,
}

impl Message {
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub const fn from(&self) -> &Address {
        &self.from
    }

    pub const fn reply_to(&self) -> Option<&Address> {
        self.reply_to.as_ref()
    }

    pub fn to(&self) -> &[Address] {
        &self.to
    }

    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn text_body(&self) -> Option<&str> {
        self.text_body.as_deref()
    }

    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Every envelope recipient: `to`, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}

/// Accumulates message fields; validation happens in [`MessageBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    reply_to: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    text_body: Option<String>,
    html_body: Option<String>,
    headers: Vec<(String, String)>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Validate the accumulated fields and produce a [`Message`].
    ///
    /// # Errors
    ///
    /// - [`ComposeError::MissingField`] without a sender, subject or any body
    /// - [`ComposeError::NoRecipients`] without a single recipient
    /// - [`ComposeError::InvalidAddress`] for an unparsable address
    /// - [`ComposeError::InvalidHeader`] for header names that are not plain
    ///   tokens, or values containing line breaks
    pub fn build(self) -> Result<Message, ComposeError> {
        let from = Address::parse(&self.from.ok_or(ComposeError::MissingField("from"))?)?;
        let subject = self.subject.ok_or(ComposeError::MissingField("subject"))?;

        if self.text_body.is_none() && self.html_body.is_none() {
            return Err(ComposeError::MissingField("body"));
        }

        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(ComposeError::NoRecipients);
        }

        for (name, value) in &self.headers {
            if name.is_empty()
                || !name
                    .bytes()
                    .all(|b| b.is_ascii_graphic() && b != b':')
            {
                return Err(ComposeError::InvalidHeader(name.clone()));
            }

            if value.contains(['\r', '\n']) {
                return Err(ComposeError::InvalidHeader(format!(
                    "{name}: value contains a line break"
                )));
            }
        }

        let parse_all = |list: Vec<String>| {
            list.iter()
                .map(String::as_str)
                .map(Address::parse)
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Message {
            from,
            reply_to: self.reply_to.as_deref().map(Address::parse).transpose()?,
            to: parse_all(self.to)?,
            cc: parse_all(self.cc)?,
            bcc: parse_all(self.bcc)?,
            subject,
            text_body: self.text_body,
            html_body: self.html_body,
            headers: self.headers,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn minimal() -> MessageBuilder {
        MessageBuilder::new()
            .from("Alerts <alerts@example.org>")
            .to("ops@example.com")
            .subject("Disk usage")
            .text_body("95% full")
    }

    #[test]
    fn test_build_minimal_message() {
        let message = minimal().build().unwrap();

        assert_eq!(message.from().addr, "alerts@example.org");
        assert_eq!(message.from().display_name.as_deref(), Some("Alerts"));
        assert_eq!(message.to().len(), 1);
        assert_eq!(message.subject(), "Disk usage");
        assert_eq!(message.text_body(), Some("95% full"));
        assert!(message.html_body().is_none());
    }

    #[test]
    fn test_recipients_are_ordered() {
        let message = minimal()
            .cc("lead@example.com")
            .bcc("audit@example.net")
            .build()
            .unwrap();

        let recipients: Vec<_> = message.recipients().map(|a| a.addr.as_str()).collect();
        assert_eq!(
            recipients,
            vec!["ops@example.com", "lead@example.com", "audit@example.net"]
        );
    }

    #[test]
    fn test_missing_fields() {
        let err = MessageBuilder::new().build().unwrap_err();
        assert_eq!(err, ComposeError::MissingField("from"));

        let err = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .text_body("hi")
            .build()
            .unwrap_err();
        assert_eq!(err, ComposeError::MissingField("subject"));

        let err = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("hi")
            .build()
            .unwrap_err();
        assert_eq!(err, ComposeError::MissingField("body"));
    }

    #[test]
    fn test_no_recipients() {
        let err = MessageBuilder::new()
            .from("a@example.com")
            .subject("hi")
            .html_body("<p>hi</p>")
            .build()
            .unwrap_err();
        assert_eq!(err, ComposeError::NoRecipients);
    }

    #[test]
    fn test_invalid_address() {
        let err = minimal().to("not-an-address").build().unwrap_err();
        assert!(matches!(err, ComposeError::InvalidAddress { .. }));

        let err = minimal()
            .to("a@example.com, b@example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidAddress { .. }));
    }

    #[test]
    fn test_invalid_headers() {
        let err = minimal().header("X Bad", "1").build().unwrap_err();
        assert_eq!(err, ComposeError::InvalidHeader("X Bad".to_string()));

        let err = minimal()
            .header("X-Injected", "1\r\nBcc: victim@example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidHeader(_)));

        let message = minimal().header("X-Campaign", "spring").build().unwrap();
        assert_eq!(
            message.headers(),
            &[("X-Campaign".to_string(), "spring".to_string())]
        );
    }

    #[test]
    fn test_address_display_and_domain() {
        let address = Address::parse("Jo Bloggs <jo@example.com>").unwrap();
        assert_eq!(address.to_string(), "Jo Bloggs <jo@example.com>");
        assert_eq!(address.domain(), "example.com");

        let bare = Address::parse("jo@example.com").unwrap();
        assert_eq!(bare.to_string(), "jo@example.com");
    }
}
