//! Retry policy for the transport call.

use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `initial * multiplier^retry`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Growth factor per retry.
        multiplier: f64,
        /// Upper bound for a single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait before the retry with the given index (0 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
                // Non-finite factors saturate at the cap
                Duration::try_from_secs_f64(initial.as_secs_f64() * factor)
                    .unwrap_or(max)
                    .min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(1))
    }
}

/// How many times, and how patiently, a retryable failure is re-attempted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay schedule.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Backoff::Fixed(Duration::ZERO))
    }

    /// Fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries, Backoff::Fixed(delay))
    }

    /// Exponential policy doubling from `initial` up to `max`.
    pub fn exponential(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self::new(
            max_retries,
            Backoff::Exponential {
                initial,
                multiplier: 2.0,
                max,
            },
        )
    }

    /// Total number of transport attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}
