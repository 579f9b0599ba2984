//! Retry wrapper around a single delivery attempt.
//!
//! Every chain entry owns a [`Retry`]. Without a policy it is the identity:
//! one attempt, failure passed through untouched. With a [`RetryPolicy`] the
//! attempt is repeated while the failure is retryable and attempts remain,
//! sleeping between attempts as the policy's [`Backoff`] dictates. Only the
//! final failure is surfaced.

mod backoff;
mod policy;

use tracing::debug;

pub use backoff::Backoff;
pub use policy::{BackoffKind, RetryConfig, RetryOn, RetryPolicy, RetryPolicyBuilder};

use crate::SendError;

/// Retry behaviour resolved for one chain entry.
#[derive(Debug, Clone, Default)]
pub enum Retry {
    /// Exactly one attempt.
    #[default]
    Once,
    /// Attempts governed by a policy.
    Policy(RetryPolicy),
}

/// Result of running an attempt under a [`Retry`], with the number of
/// attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, SendError>,
    pub attempts: u32,
}

impl From<RetryPolicy> for Retry {
    fn from(policy: RetryPolicy) -> Self {
        Self::Policy(policy)
    }
}

impl From<Option<RetryPolicy>> for Retry {
    fn from(policy: Option<RetryPolicy>) -> Self {
        policy.map_or(Self::Once, Self::Policy)
    }
}

impl Retry {
    /// Upper bound on attempts for one run.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        match self {
            Self::Once => 1,
            Self::Policy(policy) => policy.max_attempts(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> Option<&RetryPolicy> {
        match self {
            Self::Once => None,
            Self::Policy(policy) => Some(policy),
        }
    }

    /// Run `attempt` until it succeeds, fails with an error the policy does
    /// not retry, or the policy runs out of attempts.
    ///
    /// Delays are `tokio` sleeps, so dropping the returned future abandons
    /// both the in-flight attempt and any pending delay.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SendError>>,
    {
        let Self::Policy(policy) = self else {
            return Attempted {
                result: attempt().await,
                attempts: 1,
            };
        };

        let mut attempts = 0;
        loop {
            attempts += 1;

            let error = match attempt().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(error) => error,
            };

            if !policy.should_retry(attempts) || !policy.retries_on(&error) {
                return Attempted {
                    result: Err(error),
                    attempts,
                };
            }

            let delay = policy.delay_after(attempts);
            debug!(
                attempt = attempts,
                remaining = policy.remaining_attempts(attempts),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Attempt failed, retrying"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
