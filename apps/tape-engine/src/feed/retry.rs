//! Reconnect delay policy.
//!
//! The ingestor has no terminal state, so the policy never exhausts; it
//! hands out a fixed, capped delay with a small random jitter so a fleet of
//! ingestors does not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

/// Hard cap on any reconnect delay.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Fraction of the base delay used as the jitter range.
const JITTER_RATIO: f64 = 0.1;

/// Fixed-delay reconnect policy with jitter.
#[derive(Debug)]
pub struct RetryPolicy {
    /// Base delay between attempts.
    base_delay: Duration,
    /// Attempts since the last successful connection.
    attempt: u32,
}

impl RetryPolicy {
    /// Create a policy with the given base delay, capped at sixty seconds.
    #[must_use]
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay: base_delay.min(MAX_DELAY),
            attempt: 0,
        }
    }

    /// Next delay to wait before reconnecting.
    ///
    /// The delay is the base plus up to 10% jitter, never exceeding the cap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base_ms = self.base_delay.as_millis() as f64;
        let jitter = if base_ms > 0.0 {
            rand::thread_rng().gen_range(0.0..=base_ms * JITTER_RATIO)
        } else {
            0.0
        };

        Duration::from_millis((base_ms + jitter) as u64).min(MAX_DELAY)
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts since the last successful connection.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
