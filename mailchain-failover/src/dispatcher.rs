use std::{borrow::Cow, fmt, sync::Arc, time::Duration};

use mailchain_common::{ComposeError, Message, MessageBuilder};
use mailchain_tracing::traced;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    AllDeliveryFailed, ChainEntry, EntryFailure, FailoverError, Mailer, retry::Attempted,
};

type Compose<'a> = dyn Fn(MessageBuilder) -> MessageBuilder + Send + Sync + 'a;

/// What to deliver: a finished message, or a function that fills in a
/// sender's [`MessageBuilder`].
#[derive(Clone, Copy)]
pub enum DispatchRequest<'a> {
    Message(&'a Message),
    /// Invoked once per chain entry against that entry's
    /// [`Mailer::message_builder`]. The built message is reused across the
    /// entry's retries.
    Compose(&'a Compose<'a>),
}

impl fmt::Debug for DispatchRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Compose(_) => f.debug_tuple("Compose").finish_non_exhaustive(),
        }
    }
}

impl<'a> From<&'a Message> for DispatchRequest<'a> {
    fn from(message: &'a Message) -> Self {
        Self::Message(message)
    }
}

impl<'a> DispatchRequest<'a> {
    fn resolve(self, mailer: &dyn Mailer) -> Result<Cow<'a, Message>, ComposeError> {
        match self {
            Self::Message(message) => Ok(Cow::Borrowed(message)),
            Self::Compose(compose) => compose(mailer.message_builder()).build().map(Cow::Owned),
        }
    }
}

/// Per-call controls for [`FailoverDispatcher::dispatch_request`].
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl DispatchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit for the whole dispatch, overriding the dispatcher's default.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abandon the dispatch when `token` is cancelled.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Which entry accepted the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Position of the accepting entry in the chain.
    pub entry_index: usize,
    pub mailer: Arc<str>,
    /// Attempts the accepting entry needed, including the successful one.
    pub attempts: u32,
}

/// Tries an ordered chain of senders until one accepts the message.
///
/// The chain is fixed at construction and shared between clones, so a
/// dispatcher can be cloned into as many tasks as needed and dispatched
/// from concurrently.
#[derive(Debug, Clone)]
pub struct FailoverDispatcher {
    entries: Arc<[ChainEntry]>,
    timeout: Option<Duration>,
}

impl FailoverDispatcher {
    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if `entries` is empty.
    pub fn new(entries: impl IntoIterator<Item = ChainEntry>) -> Result<Self, FailoverError> {
        let entries: Arc<[ChainEntry]> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(FailoverError::invalid(
                "failover chain requires at least one mailer",
            ));
        }

        Ok(Self {
            entries,
            timeout: None,
        })
    }

    /// Chain of senders that each make a single attempt.
    ///
    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if `mailers` is empty.
    pub fn from_mailers(
        mailers: impl IntoIterator<Item = Arc<dyn Mailer>>,
    ) -> Result<Self, FailoverError> {
        Self::new(mailers.into_iter().map(ChainEntry::shared))
    }

    /// Like [`FailoverDispatcher::new`], for callers whose chain may be
    /// missing altogether.
    ///
    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if `entries` is `None` or empty.
    pub fn from_optional(entries: Option<Vec<ChainEntry>>) -> Result<Self, FailoverError> {
        entries.map_or_else(
            || Err(FailoverError::invalid("failover chain is missing")),
            Self::new,
        )
    }

    /// Default limit applied to every dispatch that does not set its own.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn default_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Sender names in chain order.
    pub fn mailers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(ChainEntry::name)
    }

    /// Deliver a finished message.
    ///
    /// # Errors
    ///
    /// [`FailoverError::AllDeliveryFailed`] when every entry fails, or
    /// [`FailoverError::TimedOut`] when the dispatcher's default timeout
    /// expires first.
    pub async fn dispatch(&self, message: &Message) -> Result<DispatchReceipt, FailoverError> {
        self.dispatch_request(message.into(), DispatchOptions::default())
            .await
    }

    /// Deliver a message built per entry by `compose`.
    ///
    /// # Errors
    ///
    /// As [`FailoverDispatcher::dispatch`]. A message that fails to build for
    /// an entry counts as that entry's failure.
    pub async fn dispatch_with<F>(&self, compose: F) -> Result<DispatchReceipt, FailoverError>
    where
        F: Fn(MessageBuilder) -> MessageBuilder + Send + Sync,
    {
        self.dispatch_request(DispatchRequest::Compose(&compose), DispatchOptions::default())
            .await
    }

    /// Deliver `request`, honouring the timeout and cancellation in `options`.
    ///
    /// # Errors
    ///
    /// - [`FailoverError::AllDeliveryFailed`] when every entry fails.
    /// - [`FailoverError::TimedOut`] when the timeout expires, whichever entry
    ///   is active.
    /// - [`FailoverError::Cancelled`] when the cancellation token fires.
    #[traced(
        instrument(level = "debug", skip_all, fields(chain = self.entries.len())),
        timing(precision = "ms")
    )]
    pub async fn dispatch_request(
        &self,
        request: DispatchRequest<'_>,
        options: DispatchOptions,
    ) -> Result<DispatchReceipt, FailoverError> {
        let limit = options.timeout.or(self.timeout);
        let chain = self.run_chain(request);

        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, chain)
                    .await
                    .unwrap_or_else(|_| Err(FailoverError::TimedOut(limit))),
                None => chain.await,
            }
        };

        let outcome = match options.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(FailoverError::Cancelled),
                    outcome = bounded => outcome,
                }
            }
            None => bounded.await,
        };

        if let Err(error) = &outcome
            && error.is_abandoned()
        {
            warn!(%error, "Dispatch abandoned");
        }

        outcome
    }

    async fn run_chain(
        &self,
        request: DispatchRequest<'_>,
    ) -> Result<DispatchReceipt, FailoverError> {
        let mut failures = Vec::with_capacity(self.entries.len());

        for (index, entry) in self.entries.iter().enumerate() {
            mailchain_common::internal!(
                level = DEBUG,
                index,
                mailer = entry.name(),
                "Trying mailer"
            );

            let message = match request.resolve(entry.mailer().as_ref()) {
                Ok(message) => message,
                Err(error) => {
                    warn!(index, mailer = entry.name(), %error, "Could not compose message");
                    failures.push(EntryFailure {
                        index,
                        mailer: entry.shared_name(),
                        attempts: 0,
                        error: error.into(),
                    });
                    continue;
                }
            };

            let Attempted { result, attempts } = entry.deliver(&message).await;
            match result {
                Ok(()) => {
                    info!(index, mailer = entry.name(), attempts, "Message delivered");
                    return Ok(DispatchReceipt {
                        entry_index: index,
                        mailer: entry.shared_name(),
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(index, mailer = entry.name(), attempts, %error, "Mailer failed");
                    failures.push(EntryFailure {
                        index,
                        mailer: entry.shared_name(),
                        attempts,
                        error,
                    });
                }
            }
        }

        error!(
            failed = failures.len(),
            failures = ?failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "All mailers failed"
        );

        Err(AllDeliveryFailed::new(failures).into())
    }
}

impl TryFrom<Vec<ChainEntry>> for FailoverDispatcher {
    type Error = FailoverError;

    fn try_from(entries: Vec<ChainEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{PermanentError, SendError};

    struct Named(&'static str, bool);

    #[async_trait]
    impl Mailer for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn message_builder(&self) -> MessageBuilder {
            MessageBuilder::new().from(format!("noreply@{}.example.com", self.0))
        }

        async fn send(&self, _message: &Message) -> Result<(), SendError> {
            if self.1 {
                Ok(())
            } else {
                Err(PermanentError::MessageRejected(self.0.to_string()).into())
            }
        }
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = FailoverDispatcher::new(Vec::new()).unwrap_err();
        assert!(matches!(err, FailoverError::InvalidConfiguration(_)));

        let err = FailoverDispatcher::from_optional(None).unwrap_err();
        assert!(matches!(err, FailoverError::InvalidConfiguration(_)));

        let err = FailoverDispatcher::from_optional(Some(Vec::new())).unwrap_err();
        assert!(matches!(err, FailoverError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_introspection() {
        let dispatcher = FailoverDispatcher::from_mailers([
            Arc::new(Named("primary", true)) as Arc<dyn Mailer>,
            Arc::new(Named("secondary", true)),
        ])
        .unwrap()
        .with_timeout(Duration::from_secs(30));

        assert_eq!(dispatcher.len(), 2);
        assert!(!dispatcher.is_empty());
        assert_eq!(
            dispatcher.mailers().collect::<Vec<_>>(),
            vec!["primary", "secondary"]
        );
        assert_eq!(dispatcher.default_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_compose_uses_mailer_builder() {
        let compose = |builder: MessageBuilder| {
            builder
                .to("user@example.com")
                .subject("Welcome")
                .text_body("Hello")
        };
        let request = DispatchRequest::Compose(&compose);

        let message = request.resolve(&Named("acme", true)).unwrap();
        assert_eq!(message.from().to_string(), "noreply@acme.example.com");
        assert!(matches!(message, Cow::Owned(_)));
    }

    #[tokio::test]
    async fn test_receipt_names_accepting_entry() {
        let dispatcher = FailoverDispatcher::new([
            ChainEntry::new(Named("down", false)),
            ChainEntry::new(Named("up", true)),
        ])
        .unwrap();

        let receipt = dispatcher
            .dispatch_with(|builder| {
                builder
                    .to("user@example.com")
                    .subject("Receipt")
                    .text_body("Hello")
            })
            .await
            .unwrap();

        assert_eq!(
            receipt,
            DispatchReceipt {
                entry_index: 1,
                mailer: Arc::from("up"),
                attempts: 1,
            }
        );
    }
}
