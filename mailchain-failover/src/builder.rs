use std::{sync::Arc, time::Duration};

use crate::{
    ChainEntry, FailoverDispatcher, FailoverError, Mailer,
    retry::{Retry, RetryConfig, RetryPolicy},
};

/// Accumulates chain entries in registration order.
///
/// [`FailoverBuilder::build`] takes a snapshot, so a builder can keep
/// growing after producing a dispatcher without changing it.
#[derive(Debug, Clone, Default)]
pub struct FailoverBuilder {
    entries: Vec<ChainEntry>,
    timeout: Option<Duration>,
}

impl FailoverBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mailer` to the chain.
    pub fn register(self, mailer: impl Mailer + 'static) -> EntryHandle {
        self.push(ChainEntry::new(mailer))
    }

    /// Append a sender that is also used elsewhere.
    pub fn register_shared(self, mailer: Arc<dyn Mailer>) -> EntryHandle {
        self.push(ChainEntry::shared(mailer))
    }

    /// Append the sender produced by `factory`.
    pub fn register_with<M, F>(self, factory: F) -> EntryHandle
    where
        M: Mailer + 'static,
        F: FnOnce() -> M,
    {
        self.register(factory())
    }

    /// Append an already configured entry.
    #[must_use]
    pub fn register_entry(mut self, entry: ChainEntry) -> Self {
        self.entries.push(entry);
        self
    }

    fn push(mut self, entry: ChainEntry) -> EntryHandle {
        self.entries.push(entry);
        EntryHandle { builder: self }
    }

    /// Default timeout for every dispatch on the built dispatcher.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if nothing was registered.
    pub fn build(&self) -> Result<FailoverDispatcher, FailoverError> {
        let dispatcher = FailoverDispatcher::new(self.entries.iter().cloned())?;

        Ok(match self.timeout {
            Some(timeout) => dispatcher.with_timeout(timeout),
            None => dispatcher,
        })
    }
}

/// The most recently registered entry, waiting for its retry behaviour.
#[derive(Debug, Clone)]
#[must_use = "choose a retry policy to get the builder back"]
pub struct EntryHandle {
    builder: FailoverBuilder,
}

impl EntryHandle {
    pub fn name(&self) -> &str {
        self.builder
            .entries
            .last()
            .map_or("", ChainEntry::name)
    }

    pub fn with_retry_policy(self, policy: RetryPolicy) -> FailoverBuilder {
        self.set(Retry::Policy(policy))
    }

    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if `config` does not describe a
    /// valid policy.
    pub fn with_retry_config(self, config: &RetryConfig) -> Result<FailoverBuilder, FailoverError> {
        RetryPolicy::try_from(config).map(|policy| self.with_retry_policy(policy))
    }

    pub fn without_retry_policy(self) -> FailoverBuilder {
        self.set(Retry::Once)
    }

    /// Leave this entry without a retry policy and register the next one.
    pub fn register(self, mailer: impl Mailer + 'static) -> Self {
        self.without_retry_policy().register(mailer)
    }

    /// Leave this entry without a retry policy and build.
    ///
    /// # Errors
    ///
    /// As [`FailoverBuilder::build`].
    pub fn build(self) -> Result<FailoverDispatcher, FailoverError> {
        self.without_retry_policy().build()
    }

    fn set(mut self, retry: Retry) -> FailoverBuilder {
        if let Some(entry) = self.builder.entries.last_mut() {
            entry.set_retry(retry);
        }
        self.builder
    }
}
