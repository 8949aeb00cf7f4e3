use rand::Rng;
use std::time::Duration;

/// High-level classification of an attempt failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request timed out (connect, low-speed, or wall clock).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (refused, reset, DNS).
    Connection,
    /// Other 5xx.
    Http5xx(u16),
    /// Any other non-2xx status (e.g. 403 on an expired presigned URL).
    HttpStatus(u16),
    /// Reading the source range failed or came up short.
    Io,
    /// Session cancelled; never retried.
    Cancelled,
    /// Anything else reported by the transport.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Mark the part permanently failed.
    NoRetry,
    /// Re-queue the part after the given delay.
    RetryAfter(Duration),
}

/// Linear backoff: the delay after attempt `n` is `base_delay * n`, plus
/// optional jitter of up to 20%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per part (including the first).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if kind == ErrorKind::Cancelled || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    /// Backoff before the attempt following `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(attempt.max(1));
        if !self.jitter || base.is_zero() {
            return base;
        }
        let max_extra = base.as_millis() as u64 / 5;
        if max_extra == 0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        base.saturating_add(Duration::from_millis(extra))
    }
}
