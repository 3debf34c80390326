//! Trade domain type.
//!
//! A [`Trade`] is one executed trade reported by the upstream feed. It is
//! immutable once constructed; `(symbol, id)` identifies it uniquely and is
//! the dedup key enforced by the event store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One executed trade from the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange-assigned trade id, unique within a symbol.
    pub id: u64,
    /// Symbol the trade executed on.
    pub symbol: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Event time reported by the exchange.
    pub time: DateTime<Utc>,
}

impl Trade {
    /// Create a new trade.
    #[must_use]
    pub fn new(
        id: u64,
        symbol: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            price,
            quantity,
            time,
        }
    }

    /// Event time as epoch milliseconds.
    #[must_use]
    pub fn time_millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Notional value of the trade (price × quantity).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Direction a trade is counted toward cumulative volume delta.
///
/// The side is inferred from the price change against the previous trade:
/// an uptick is `Up`, a downtick is `Down`, and an unchanged price inherits
/// the previous trade's side. The first trade of a symbol defaults to `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowSide {
    /// Buying pressure; quantity is added to the flow.
    Up,
    /// Selling pressure; quantity is subtracted from the flow.
    Down,
}

impl FlowSide {
    /// Signed multiplier for flow accumulation.
    #[must_use]
    pub const fn signum(self) -> Decimal {
        match self {
            Self::Up => Decimal::ONE,
            Self::Down => Decimal::NEGATIVE_ONE,
        }
    }
}

impl Default for FlowSide {
    fn default() -> Self {
        Self::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_notional() {
        let trade = Trade::new(1, "BTCUSDT", dec!(100.50), dec!(2), Utc::now());
        assert_eq!(trade.notional(), dec!(201.00));
    }

    #[test]
    fn trade_time_millis_roundtrip() {
        let time = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let trade = Trade::new(1, "BTCUSDT", dec!(1), dec!(1), time);
        assert_eq!(trade.time_millis(), 1_700_000_000_123);
    }

    #[test]
    fn flow_side_signum() {
        assert_eq!(FlowSide::Up.signum(), Decimal::ONE);
        assert_eq!(FlowSide::Down.signum(), Decimal::NEGATIVE_ONE);
        assert_eq!(FlowSide::default(), FlowSide::Up);
    }
}
