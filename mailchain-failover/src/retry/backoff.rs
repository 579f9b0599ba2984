//! Delay between retries of one chain entry

use std::time::Duration;

use rand::Rng;

/// How long to wait before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,

    /// Wait the same amount before every retry.
    Fixed(Duration),

    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1);
                2u32.checked_pow(exponent)
                    .map_or(max, |multiplier| base.saturating_mul(multiplier).min(max))
            }
        }
    }
}

/// Randomise `delay` within `±jitter_factor` of its value.
///
/// Keeps retries of many concurrent dispatches against the same provider
/// from lining up.
pub fn apply_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if delay.is_zero() || jitter_factor <= 0.0 {
        return delay;
    }

    let secs = delay.as_secs_f64();
    let jitter_range = secs * jitter_factor;
    let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::try_from_secs_f64((secs + jitter).max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backoff() {
        assert_eq!(Backoff::None.delay(1), Duration::ZERO);
        assert_eq!(Backoff::None.delay(10), Duration::ZERO);
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_millis(250));
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(7), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        };

        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(6), Duration::from_secs(32));
        assert_eq!(backoff.delay(7), Duration::from_secs(60), "capped at max");
        assert_eq!(backoff.delay(40), Duration::from_secs(60), "overflow caps at max");
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let delay = Duration::from_secs(10);

        for _ in 0..100 {
            let jittered = apply_jitter(delay, 0.2);
            assert!(
                jittered >= Duration::from_secs(8) && jittered <= Duration::from_secs(12),
                "{jittered:?} outside ±20% of {delay:?}"
            );
        }
    }

    #[test]
    fn test_jitter_saturates_at_max() {
        for _ in 0..100 {
            let jittered = apply_jitter(Duration::MAX, 0.5);
            assert!(jittered >= Duration::MAX / 3, "{jittered:?}");
        }

        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::MAX,
        };
        assert_eq!(backoff.delay(40), Duration::MAX);
        assert!(apply_jitter(backoff.delay(40), 1.0) <= Duration::MAX);
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let delay = Duration::from_millis(1500);
        assert_eq!(apply_jitter(delay, 0.0), delay);
        assert_eq!(apply_jitter(Duration::ZERO, 0.5), Duration::ZERO);
    }
}
