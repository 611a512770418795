//! Backoff schedule for repeating failed provider calls.
//!
//! Only [`Resilient`](super::Resilient) drives this; stages see a single
//! call that either produced a payload or failed for good.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::errors::ProviderError;

/// How the pause grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Doubles after every failure.
    #[default]
    Exponential,
    /// Same pause every time.
    Fixed,
}

/// Randomisation applied to each pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the computed pause as is.
    None,
    /// Anywhere between zero and the computed pause.
    #[default]
    Full,
    /// At least half the computed pause.
    Equal,
}

/// Retry policy for one provider.
///
/// `max_attempts` counts the first call, so `1` disables retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total calls allowed per operation.
    pub max_attempts: usize,
    /// Pause after the first failure, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any pause, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth of the pause.
    pub backoff: BackoffStrategy,
    /// Randomisation of the pause.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Same as [`RetryConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One call, no retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets `max_attempts`.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the first pause.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the pause cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets how the pause grows.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the pause randomisation.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Starts a fresh schedule for one operation.
    #[must_use]
    pub fn schedule(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            failures: 0,
        }
    }
}

/// Pauses for one operation, consumed failure by failure.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    failures: usize,
}

impl Backoff<'_> {
    /// Failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Records a failure and returns the pause before the next call, or
    /// `None` once every attempt has been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.config.max_attempts {
            return None;
        }
        Some(Duration::from_millis(self.jittered(self.ceiling())))
    }

    /// Pause before jitter for the current failure count.
    fn ceiling(&self) -> u64 {
        let RetryConfig {
            base_delay_ms,
            max_delay_ms,
            backoff,
            ..
        } = *self.config;
        let grown = match backoff {
            BackoffStrategy::Fixed => base_delay_ms,
            BackoffStrategy::Exponential => {
                let doublings = u32::try_from(self.failures - 1).unwrap_or(u32::MAX);
                base_delay_ms.saturating_mul(2u64.saturating_pow(doublings))
            }
        };
        grown.min(max_delay_ms)
    }

    fn jittered(&self, ceiling: u64) -> u64 {
        let mut rng = rand::thread_rng();
        match self.config.jitter {
            JitterStrategy::None => ceiling,
            JitterStrategy::Full if ceiling > 0 => rng.gen_range(0..=ceiling),
            JitterStrategy::Equal if ceiling > 1 => {
                let floor = ceiling / 2;
                floor + rng.gen_range(0..=ceiling - floor)
            }
            JitterStrategy::Full | JitterStrategy::Equal => ceiling,
        }
    }
}

/// Runs `call` until it succeeds, fails permanently, or the schedule runs out.
///
/// Only errors for which [`ProviderError::is_transient`] holds are retried.
/// The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = config.schedule();
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => err,
        };
        let Some(delay) = backoff.next_delay() else {
            return Err(err);
        };
        debug!(
            operation,
            failures = backoff.failures(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Provider call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
