use std::{fmt, sync::Arc};

use mailchain_common::Message;

use crate::{
    Mailer,
    retry::{Attempted, Retry, RetryPolicy},
};

/// One sender in a failover chain, paired with its retry behaviour.
///
/// Entries without a policy make exactly one attempt per dispatch.
#[derive(Clone)]
pub struct ChainEntry {
    mailer: Arc<dyn Mailer>,
    name: Arc<str>,
    retry: Retry,
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("mailer", &self.name)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ChainEntry {
    pub fn new(mailer: impl Mailer + 'static) -> Self {
        Self::shared(Arc::new(mailer))
    }

    /// Entry for a sender that is also used elsewhere.
    pub fn shared(mailer: Arc<dyn Mailer>) -> Self {
        let name = Arc::from(mailer.name());
        Self {
            mailer,
            name,
            retry: Retry::Once,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Retry::Policy(policy);
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = Retry::Once;
        self
    }

    pub(crate) fn set_retry(&mut self, retry: Retry) {
        self.retry = retry;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    pub const fn retry(&self) -> &Retry {
        &self.retry
    }

    /// Hand `message` to the sender under this entry's retry behaviour.
    pub(crate) async fn deliver(&self, message: &Message) -> Attempted<()> {
        self.retry
            .run(move || async move {
                mailchain_common::outgoing!(
                    level = DEBUG,
                    mailer = %self.name,
                    recipients = message.recipients().count(),
                    "Attempting delivery"
                );
                self.mailer.send(message).await
            })
            .await
    }
}

impl From<Arc<dyn Mailer>> for ChainEntry {
    fn from(mailer: Arc<dyn Mailer>) -> Self {
        Self::shared(mailer)
    }
}
