//! Typed error handling for failover dispatch.
//!
//! Two layers of errors exist:
//! - [`SendError`] is what a single sender reports for a single attempt. The
//!   dispatcher catches these, and they only reach callers folded into an
//!   [`AllDeliveryFailed`].
//! - [`FailoverError`] is what crosses the dispatcher boundary: bad
//!   configuration, total failure of the chain, or external abandonment.

use std::{fmt, sync::Arc, time::Duration};

use mailchain_common::ComposeError;
use thiserror::Error;

/// Failure reported by a sender for one delivery attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// The provider rejected the message and repeating it will not help.
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// The provider could not take the message right now.
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// The message could not be built for this sender.
    #[error("Compose failure: {0}")]
    Compose(#[from] ComposeError),

    /// An error from a transport SDK that has no better classification.
    #[error("Sender error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Rejections that should not be retried against the same sender.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address is invalid or rejected by the provider.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message was rejected (policy violation, spam, suppression list).
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// Credentials were refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Message size exceeds the provider's limit.
    #[error("Message too large: {0}")]
    MessageTooLarge(String),

    /// The sender cannot express something the message needs.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Transient failures that may succeed on a later attempt.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to reach the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Provider is busy or temporarily unavailable.
    #[error("Server busy: {0}")]
    ServerBusy(String),

    /// Provider is throttling us.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The attempt did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// TLS negotiation failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

impl SendError {
    /// Wrap an arbitrary transport error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }

    /// Returns `true` if this error is temporary.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if the message itself could not be built.
    #[must_use]
    pub const fn is_compose(&self) -> bool {
        matches!(self, Self::Compose(_))
    }

    /// Whether repeating the same attempt could plausibly succeed.
    ///
    /// Permanent rejections and compose failures are final; everything else,
    /// including unclassified transport errors, is worth another try.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_) | Self::Compose(_))
    }
}

/// Terminal failure of one chain entry, after its retries were used up.
#[derive(Debug)]
pub struct EntryFailure {
    /// Position of the entry in the chain.
    pub index: usize,
    /// Name of the entry's sender.
    pub mailer: Arc<str>,
    /// Attempts made against the sender. Zero when the message could not be
    /// composed for it.
    pub attempts: u32,
    /// The last error the sender reported.
    pub error: SendError,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} after {} attempt{}: {}",
            self.index,
            self.mailer,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.error
        )
    }
}

/// Every entry in the chain failed.
///
/// Holds exactly one [`EntryFailure`] per entry, in chain order.
#[derive(Debug)]
pub struct AllDeliveryFailed {
    failures: Vec<EntryFailure>,
}

impl AllDeliveryFailed {
    pub(crate) const fn new(failures: Vec<EntryFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[EntryFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<EntryFailure> {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntryFailure> {
        self.failures.iter()
    }
}

impl fmt::Display for AllDeliveryFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All {} mailers failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            fmt::Display::fmt(failure, f)?;
        }
        Ok(())
    }
}

impl std::error::Error for AllDeliveryFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .last()
            .map(|failure| &failure.error as &(dyn std::error::Error + 'static))
    }
}

impl<'a> IntoIterator for &'a AllDeliveryFailed {
    type Item = &'a EntryFailure;
    type IntoIter = std::slice::Iter<'a, EntryFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Errors surfaced by the dispatcher and its configuration surface.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// The chain or one of its policies cannot be built as described.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Every entry in the chain failed.
    #[error(transparent)]
    AllDeliveryFailed(#[from] AllDeliveryFailed),

    /// The caller's cancellation token fired before the chain finished.
    #[error("Dispatch cancelled")]
    Cancelled,

    /// The dispatch as a whole exceeded its time limit.
    #[error("Dispatch timed out after {0:?}")]
    TimedOut(Duration),
}

impl FailoverError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// The per-entry failures, if the chain was exhausted.
    #[must_use]
    pub const fn all_failed(&self) -> Option<&AllDeliveryFailed> {
        match self {
            Self::AllDeliveryFailed(failed) => Some(failed),
            _ => None,
        }
    }

    /// Returns `true` for cancellation and timeout, which abandon the chain
    /// rather than exhaust it.
    #[must_use]
    pub const fn is_abandoned(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }
}
