//! Pluggable reconnection strategies.

use std::fmt::Debug;
use std::time::Duration;

use crate::error::TransportError;

/// What to do after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Open a new connection after the given delay.
    RetryAfter(Duration),
    /// Stop reconnecting; the caller gets a terminal disconnect.
    GiveUp,
}

/// Decides whether and when to reconnect.
///
/// `attempt` is 1-based and counts consecutive failed connections since the
/// last successful handshake. Implementations must be stateless so that a
/// strategy can be swapped at runtime.
pub trait ReconnectStrategy: Send + Sync + Debug + 'static {
    fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> ReconnectDecision;
}

/// Never reconnect. Equivalent to configuring no strategy at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl ReconnectStrategy for NoRetry {
    fn should_reconnect(&self, _attempt: u32, _last_error: &TransportError) -> ReconnectDecision {
        ReconnectDecision::GiveUp
    }
}

/// Retry at a constant interval, up to `max_attempts` times.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl FixedDelay {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self { interval, max_attempts }
    }
}

impl ReconnectStrategy for FixedDelay {
    fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> ReconnectDecision {
        if attempt > self.max_attempts || !last_error.is_retryable() {
            return ReconnectDecision::GiveUp;
        }
        ReconnectDecision::RetryAfter(self.interval)
    }
}

/// Exponential backoff: `base * multiplier^(attempt - 1)`, capped at
/// `max_delay`, for at most `max_attempts` attempts.
///
/// No jitter is applied, so successive delays never decrease.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first reconnect.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            ..Default::default()
        }
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before the `attempt`-th reconnect (1-based), ignoring the budget.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        let cap_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }
}

impl ReconnectStrategy for ExponentialBackoff {
    fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> ReconnectDecision {
        if attempt > self.max_attempts || !last_error.is_retryable() {
            return ReconnectDecision::GiveUp;
        }
        ReconnectDecision::RetryAfter(self.delay_for(attempt))
    }
}
