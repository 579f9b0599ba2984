//! Retry policy for a single chain entry.

use std::{fmt, num::NonZeroU32, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use super::backoff::{Backoff, apply_jitter};
use crate::{FailoverError, SendError};

type Predicate = Arc<dyn Fn(&SendError) -> bool + Send + Sync>;

fn any_failure() -> Predicate {
    Arc::new(|_: &SendError| true)
}

/// Bounded retry behaviour for one chain entry.
///
/// Immutable once built. Cloning shares the retry predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    backoff: Backoff,
    jitter_factor: f64,
    retry_if: Predicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter_factor", &self.jitter_factor)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// `retries` immediate retries after the first attempt, whatever the
    /// failure.
    #[must_use]
    pub fn retries(retries: u32) -> Self {
        Self {
            max_attempts: NonZeroU32::MIN.saturating_add(retries),
            backoff: Backoff::None,
            jitter_factor: 0.0,
            retry_if: any_failure(),
        }
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Check if another attempt is allowed after `attempt_count` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts.get()
    }

    /// Check if `error` is one this policy retries.
    #[must_use]
    pub fn retries_on(&self, error: &SendError) -> bool {
        (self.retry_if)(error)
    }

    /// Attempts left after `attempt_count` attempts.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.max_attempts.get().saturating_sub(attempt_count)
    }

    /// Delay to wait after the given failed attempt (1-indexed), jitter applied.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        apply_jitter(self.backoff.delay(attempt), self.jitter_factor)
    }
}

/// Fluent construction of a [`RetryPolicy`].
///
/// Defaults to three attempts, no delay, and retrying every failure. Use
/// `retry_if(SendError::is_retryable)` to give up on permanent rejections.
#[derive(Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    backoff: Backoff,
    jitter_factor: f64,
    retry_if: Predicate,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff: Backoff::None,
            jitter_factor: 0.0,
            retry_if: any_failure(),
        }
    }
}

impl RetryPolicyBuilder {
    /// Total attempts including the first. Must be at least 1.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Fixed delay before every retry.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.backoff = Backoff::Fixed(delay);
        self
    }

    /// Exponential delay starting at `base`, capped at `max`.
    #[must_use]
    pub fn exponential(mut self, base: Duration, max: Duration) -> Self {
        self.backoff = Backoff::Exponential { base, max };
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Randomise each delay within `±factor` of its value. Must be in `0..=1`.
    #[must_use]
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Only retry failures for which `predicate` returns `true`.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SendError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// # Errors
    ///
    /// [`FailoverError::InvalidConfiguration`] if `max_attempts` is zero or
    /// the jitter factor lies outside `0..=1`.
    pub fn build(self) -> Result<RetryPolicy, FailoverError> {
        let max_attempts = NonZeroU32::new(self.max_attempts)
            .ok_or_else(|| FailoverError::invalid("retry max_attempts must be at least 1"))?;

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(FailoverError::invalid(format!(
                "retry jitter_factor must be between 0 and 1, got {}",
                self.jitter_factor
            )));
        }

        if let Backoff::Exponential { base, max } = self.backoff
            && base > max
        {
            return Err(FailoverError::invalid(format!(
                "retry base delay {base:?} exceeds max delay {max:?}"
            )));
        }

        Ok(RetryPolicy {
            max_attempts,
            backoff: self.backoff,
            jitter_factor: self.jitter_factor,
            retry_if: self.retry_if,
        })
    }
}

/// Which failures a configured policy retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryOn {
    /// Every failure.
    #[default]
    Any,
    /// Anything except permanent rejections and compose failures.
    Retryable,
    /// Only [`SendError::Temporary`] failures.
    Temporary,
}

/// Shape of the delay between retries in a configured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Serializable form of a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds). Zero retries immediately.
    ///
    /// Default: 0
    #[serde(default)]
    pub delay_ms: u64,

    /// Whether the delay stays fixed or doubles on each retry.
    ///
    /// Default: `Fixed`
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff (milliseconds).
    ///
    /// Default: 30000 (30 seconds)
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor for randomizing retry delays (±fraction).
    ///
    /// Default: 0.0
    #[serde(default)]
    pub jitter_factor: f64,

    /// Which failures are retried.
    ///
    /// Default: `Any`
    #[serde(default)]
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            delay_ms: 0,
            backoff: BackoffKind::default(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: 0.0,
            retry_on: RetryOn::default(),
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = FailoverError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        let delay = Duration::from_millis(config.delay_ms);
        let backoff = match (config.backoff, delay.is_zero()) {
            (_, true) => Backoff::None,
            (BackoffKind::Fixed, false) => Backoff::Fixed(delay),
            (BackoffKind::Exponential, false) => Backoff::Exponential {
                base: delay,
                max: Duration::from_millis(config.max_delay_ms),
            },
        };

        let builder = Self::builder()
            .max_attempts(config.max_attempts)
            .backoff(backoff)
            .jitter(config.jitter_factor);

        let builder = match config.retry_on {
            RetryOn::Any => builder,
            RetryOn::Retryable => builder.retry_if(SendError::is_retryable),
            RetryOn::Temporary => builder.retry_if(SendError::is_temporary),
        };

        builder.build()
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn max_delay_ms() -> u64 {
        30_000 // 30 seconds
    }
}
