//! Bounded rolling price window.
//!
//! Maintains running sum and sum-of-squares alongside a FIFO buffer so the
//! standard deviation over the last N prices is O(1) per update instead of
//! a rescan. Eviction is by trade order, not time: once the window is full,
//! each push drops the oldest price. Accumulation stays in `Decimal`, which
//! is exact, so the subtract-on-evict update cannot drift; only the final
//! square root goes through `f64`.

use std::collections::VecDeque;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Fixed-capacity FIFO window with O(1) standard deviation.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
    sum_sq: Decimal,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` values.
    ///
    /// A zero capacity is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: Decimal::ZERO,
            sum_sq: Decimal::ZERO,
        }
    }

    /// Push a value, evicting the oldest when the window is full.
    ///
    /// Returns `false` and leaves the window unchanged when squaring or
    /// accumulating the value would overflow; the caller decides whether
    /// a skipped sample is worth a log line.
    pub fn push(&mut self, value: Decimal) -> bool {
        let Some(square) = value.checked_mul(value) else {
            return false;
        };
        let Some(sum) = self.sum.checked_add(value) else {
            return false;
        };
        let Some(sum_sq) = self.sum_sq.checked_add(square) else {
            return false;
        };

        self.sum = sum;
        self.sum_sq = sum_sq;
        self.values.push_back(value);

        while self.values.len() > self.capacity {
            if let Some(evicted) = self.values.pop_front() {
                self.sum -= evicted;
                self.sum_sq -= evicted * evicted;
            }
        }
        true
    }

    /// Number of values currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the window holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the window has reached capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the held values, `None` when empty.
    #[must_use]
    pub fn mean(&self) -> Option<Decimal> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.sum / Decimal::from(self.values.len()))
    }

    /// Sample standard deviation of the held values.
    ///
    /// Returns `None` until at least two values are present.
    #[must_use]
    pub fn std_dev(&self) -> Option<Decimal> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }

        let n_dec = Decimal::from(n);
        let variance = (self.sum_sq - self.sum * self.sum / n_dec) / (n_dec - Decimal::ONE);

        // Exact accumulation can still leave a tiny negative residue after
        // the division; clamp before the square root.
        let variance = variance.to_f64()?.max(0.0);
        Decimal::from_f64(variance.sqrt())
    }
}
