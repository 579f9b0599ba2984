//! Building a failover chain from configuration.
//!
//! Senders are referred to by name; a [`MailerRegistry`] maps those names to
//! the code that constructs them. A chain in RON looks like:
//!
//! ```ron
//! (
//!     timeout_secs: 60,
//!     chain: [
//!         (
//!             mailer: "smtp",
//!             retry: (max_attempts: 3, delay_ms: 500, backoff: Exponential),
//!         ),
//!         (mailer: "api"),
//!     ],
//! )
//! ```

use std::{fmt, sync::Arc, time::Duration};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{FailoverBuilder, FailoverDispatcher, FailoverError, Mailer, retry::RetryConfig};

/// One sender in a configured chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Name the sender is registered under in the [`MailerRegistry`].
    pub mailer: String,

    /// Retry policy for this sender. Absent means a single attempt.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

/// A failover chain, in the order senders are tried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Limit for a whole dispatch, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub chain: Vec<EntryConfig>,
}

type Factory = Arc<dyn Fn() -> Arc<dyn Mailer> + Send + Sync>;

/// Named sender constructors available to configured chains.
#[derive(Clone, Default)]
pub struct MailerRegistry {
    factories: AHashMap<String, Factory>,
}

impl fmt::Debug for MailerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerRegistry")
            .field("mailers", &self.names())
            .finish()
    }
}

impl MailerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Mailer + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factories.insert(
            name.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn Mailer>),
        );
        self
    }

    /// Register an existing sender; every chain naming it shares the instance.
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        mailer: Arc<dyn Mailer>,
    ) -> &mut Self {
        self.factories
            .insert(name.into(), Arc::new(move || Arc::clone(&mailer)));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the sender registered under `name`.
    ///
    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if nothing is registered under
    /// `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Mailer>, FailoverError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FailoverError::invalid(format!("unknown mailer '{name}'")))
    }
}

impl FailoverConfig {
    /// Resolve every entry against `registry`, in order.
    ///
    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] for an unknown mailer name, an
    /// invalid retry policy or a zero timeout.
    pub fn builder(&self, registry: &MailerRegistry) -> Result<FailoverBuilder, FailoverError> {
        let mut builder = FailoverBuilder::new();

        if let Some(secs) = self.timeout_secs {
            if secs == 0 {
                return Err(FailoverError::invalid("timeout_secs must be greater than 0"));
            }
            builder = builder.timeout(Duration::from_secs(secs));
        }

        for (index, entry) in self.chain.iter().enumerate() {
            let handle = builder.register_shared(registry.resolve(&entry.mailer)?);

            builder = match &entry.retry {
                Some(retry) => handle.with_retry_config(retry).map_err(|e| match e {
                    FailoverError::InvalidConfiguration(reason) => FailoverError::invalid(format!(
                        "chain[{index}] ({}): {reason}",
                        entry.mailer
                    )),
                    other => other,
                })?,
                None => handle.without_retry_policy(),
            };
        }

        Ok(builder)
    }

    /// # Errors
    ///
    /// As [`FailoverConfig::builder`], and [`FailoverError::InvalidConfiguration`]
    /// for an empty chain.
    pub fn build(&self, registry: &MailerRegistry) -> Result<FailoverDispatcher, FailoverError> {
        self.builder(registry)?.build()
    }
}
