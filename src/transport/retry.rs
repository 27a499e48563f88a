//! Retry policy for transient failures.
//!
//! Intervals between attempts come from an exponential backoff sequence
//! unless the service advised a wait through `X-Rate-Limit-Reset`, in which
//! case that wait is honoured with a small positive jitter so concurrent
//! workers do not all wake on the same second.

use crate::config::ProviderConfig;
use crate::transport::classify::ErrorClass;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::{Duration, Instant};

/// Upper bound of the jitter added to server-advised waits, as a fraction.
pub const RATE_LIMIT_JITTER: f64 = 0.1;

/// Default max elapsed time for create/update paths.
pub const LONG_MAX_ELAPSED: Duration = Duration::from_secs(60 * 60);

/// Default max elapsed time for reads.
pub const SHORT_MAX_ELAPSED: Duration = Duration::from_secs(5 * 60);

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// First exponential interval
    pub initial_interval: Duration,
    /// Growth factor between intervals
    pub multiplier: f64,
    /// Randomisation applied to exponential intervals (0 disables)
    pub randomization_factor: f64,
    /// Cap on any single wait
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed: Duration,
    /// Maximum number of retries (0 = no retries)
    pub max_retries: u32,
    /// Wait used for 429 responses that carry no reset header
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(300),
            max_elapsed: LONG_MAX_ELAPSED,
            max_retries: 5,
            rate_limit_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy derived from provider settings.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_interval: Duration::from_secs(config.max_wait_seconds),
            max_retries: if config.backoff { config.max_retries } else { 0 },
            rate_limit_wait: Duration::from_secs(config.min_wait_seconds),
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn without_randomization(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    /// Whether a response with `status`/`class` may be retried.
    ///
    /// `retry_on_status` injects extra statuses for a single call.
    pub fn is_retryable(&self, status: u16, class: ErrorClass, retry_on_status: &[u16]) -> bool {
        class.is_transient() || retry_on_status.contains(&status)
    }

    /// Start tracking one call.
    pub fn start(&self) -> RetryState {
        let backoff = ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        RetryState {
            policy: self.clone(),
            backoff,
            retries: 0,
            started: Instant::now(),
        }
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    backoff: ExponentialBackoff,
    retries: u32,
    started: Instant,
}

impl RetryState {
    /// Number of retries already scheduled.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Delay before the next attempt, or `None` when the call must give up.
    ///
    /// `advised` is a server-advised wait (rate-limit reset); it replaces the
    /// exponential interval and receives positive jitter. No single wait
    /// exceeds `max_interval`.
    pub fn next_delay(&mut self, advised: Option<Duration>) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }

        let delay = match advised {
            Some(wait) => jittered(wait).min(self.policy.max_interval),
            None => self.backoff.next_backoff()?,
        };

        if self.elapsed() + delay > self.policy.max_elapsed {
            return None;
        }

        self.retries += 1;
        Some(delay)
    }
}

/// Add up to [`RATE_LIMIT_JITTER`] of positive jitter to `wait`.
pub fn jittered(wait: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.0..=RATE_LIMIT_JITTER);
    wait + wait.mul_f64(factor)
}

/// Wait until the epoch-second `reset`, measured against the server clock.
pub fn reset_wait(reset_epoch: i64, server_now: DateTime<Utc>) -> Duration {
    let reset = DateTime::<Utc>::from_timestamp(reset_epoch, 0).unwrap_or(server_now);
    (reset - server_now).to_std().unwrap_or(Duration::ZERO)
}
