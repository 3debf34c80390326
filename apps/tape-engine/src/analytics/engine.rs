//! Incremental per-symbol trade analytics.
//!
//! Every accepted trade updates running sums in O(1): session VWAP from
//! cumulative price*quantity over cumulative quantity, signed cumulative
//! flow from the tick rule, and volatility bands from a rolling window of
//! recent prices. Each update also appends a point to the bar tape so the
//! read paths can serve overlays and resampled bars without touching the
//! database.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use super::bars::{Bar, Tape, TapePoint};
use super::window::RollingWindow;
use crate::trade::{FlowSide, Trade};

/// Band half-width in standard deviations.
const BAND_WIDTH: Decimal = Decimal::TWO;

/// Errors from applying a trade to the analytics state.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The trade's event time precedes the last applied trade.
    ///
    /// Running sums only move forward; an older trade cannot be spliced in
    /// without recomputing the session. The caller logs and drops it.
    #[error("out-of-order trade {trade_id}: event time {time_millis} precedes {last_millis}")]
    OutOfOrder {
        /// Rejected trade id.
        trade_id: u64,
        /// Rejected trade's event time in epoch milliseconds.
        time_millis: i64,
        /// Event time of the last applied trade.
        last_millis: i64,
    },
}

/// Sizing knobs for per-symbol state.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsConfig {
    /// Number of recent prices in the volatility window.
    pub window_size: usize,
    /// Number of per-trade points retained on the bar tape.
    pub tape_depth: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            tape_depth: 3_000,
        }
    }
}

/// Point-in-time view of a symbol's analytics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsSnapshot {
    /// Symbol these figures describe.
    pub symbol: String,
    /// Trades applied this session.
    pub trade_count: u64,
    /// Last traded price.
    pub last_price: Decimal,
    /// Event time of the last applied trade, epoch milliseconds.
    pub last_time_millis: i64,
    /// Session volume-weighted average price.
    pub vwap: Decimal,
    /// Upper volatility band, once the window can produce one.
    pub upper: Option<Decimal>,
    /// Lower volatility band, once the window can produce one.
    pub lower: Option<Decimal>,
    /// Cumulative signed flow.
    pub flow: Decimal,
    /// Side assigned to the last trade.
    pub side: FlowSide,
}

/// Running analytics state for one symbol.
#[derive(Debug)]
pub struct SymbolAnalytics {
    symbol: String,
    trade_count: u64,
    last_price: Decimal,
    last_time_millis: i64,
    last_side: FlowSide,
    notional_sum: Decimal,
    quantity_sum: Decimal,
    flow: Decimal,
    window: RollingWindow,
    tape: Tape,
}

impl SymbolAnalytics {
    /// Create empty state for a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>, config: AnalyticsConfig) -> Self {
        Self {
            symbol: symbol.into(),
            trade_count: 0,
            last_price: Decimal::ZERO,
            last_time_millis: 0,
            last_side: FlowSide::default(),
            notional_sum: Decimal::ZERO,
            quantity_sum: Decimal::ZERO,
            flow: Decimal::ZERO,
            window: RollingWindow::new(config.window_size),
            tape: Tape::new(config.tape_depth),
        }
    }

    /// Apply one trade to the running state.
    ///
    /// Trades at the same event time as the last applied trade are
    /// accepted; only strictly older trades are rejected, and rejection
    /// leaves every figure unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::OutOfOrder`] for a strictly older trade.
    pub fn apply(&mut self, trade: &Trade) -> Result<(), AnalyticsError> {
        let time_millis = trade.time_millis();
        if self.trade_count > 0 && time_millis < self.last_time_millis {
            return Err(AnalyticsError::OutOfOrder {
                trade_id: trade.id,
                time_millis,
                last_millis: self.last_time_millis,
            });
        }

        // Tick rule: price up is buying pressure, price down is selling,
        // an unchanged price inherits the previous side.
        let side = if self.trade_count == 0 || trade.price == self.last_price {
            if self.trade_count == 0 {
                FlowSide::Up
            } else {
                self.last_side
            }
        } else if trade.price > self.last_price {
            FlowSide::Up
        } else {
            FlowSide::Down
        };

        self.notional_sum += trade.notional();
        self.quantity_sum += trade.quantity;
        self.flow += side.signum() * trade.quantity;
        if !self.window.push(trade.price) {
            warn!(
                symbol = %self.symbol,
                price = %trade.price,
                "Price too large for the volatility window, sample skipped"
            );
        }

        self.trade_count += 1;
        self.last_price = trade.price;
        self.last_time_millis = time_millis;
        self.last_side = side;

        let vwap = self.vwap();
        let (upper, lower) = self.bands(vwap);
        self.tape.push(TapePoint {
            time_millis,
            price: trade.price,
            vwap,
            upper,
            lower,
            flow: self.flow,
        });

        Ok(())
    }

    /// Session VWAP; zero before the first trade.
    #[must_use]
    pub fn vwap(&self) -> Decimal {
        if self.quantity_sum.is_zero() {
            return Decimal::ZERO;
        }
        self.notional_sum / self.quantity_sum
    }

    /// Trades applied this session.
    #[must_use]
    pub const fn trade_count(&self) -> u64 {
        self.trade_count
    }

    /// Cumulative signed flow.
    #[must_use]
    pub const fn flow(&self) -> Decimal {
        self.flow
    }

    /// Current snapshot of every figure.
    #[must_use]
    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let vwap = self.vwap();
        let (upper, lower) = self.bands(vwap);
        AnalyticsSnapshot {
            symbol: self.symbol.clone(),
            trade_count: self.trade_count,
            last_price: self.last_price,
            last_time_millis: self.last_time_millis,
            vwap,
            upper,
            lower,
            flow: self.flow,
            side: self.last_side,
        }
    }

    /// Resampled bars over the retained tape.
    #[must_use]
    pub fn bars(&self, bucket_ms: i64, max_bars: usize) -> Vec<Bar> {
        self.tape.resample(bucket_ms, max_bars)
    }

    fn bands(&self, vwap: Decimal) -> (Option<Decimal>, Option<Decimal>) {
        match self.window.std_dev() {
            Some(std) => (Some(vwap + BAND_WIDTH * std), Some(vwap - BAND_WIDTH * std)),
            None => (None, None),
        }
    }
}

/// Analytics state for every streamed symbol.
#[derive(Debug)]
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    symbols: HashMap<String, SymbolAnalytics>,
}

/// Analytics engine shared between the ingestor and read paths.
pub type SharedAnalytics = Arc<RwLock<AnalyticsEngine>>;

impl AnalyticsEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            symbols: HashMap::new(),
        }
    }

    /// Wrap an empty engine for shared use.
    #[must_use]
    pub fn shared(config: AnalyticsConfig) -> SharedAnalytics {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Apply a trade to its symbol's state, creating the state on first
    /// sight of the symbol.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::OutOfOrder`] for a strictly older trade;
    /// the symbol's state is unchanged in that case.
    pub fn apply(&mut self, trade: &Trade) -> Result<(), AnalyticsError> {
        let state = self
            .symbols
            .entry(trade.symbol.clone())
            .or_insert_with(|| {
                debug!(symbol = %trade.symbol, "Tracking new symbol");
                SymbolAnalytics::new(trade.symbol.clone(), self.config)
            });
        state.apply(trade)
    }

    /// Snapshot for one symbol, if any trades have been seen for it.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<AnalyticsSnapshot> {
        self.symbols.get(symbol).map(SymbolAnalytics::snapshot)
    }

    /// Resampled bars for one symbol.
    #[must_use]
    pub fn bars(&self, symbol: &str, bucket_ms: i64, max_bars: usize) -> Vec<Bar> {
        self.symbols
            .get(symbol)
            .map(|s| s.bars(bucket_ms, max_bars))
            .unwrap_or_default()
    }

    /// Symbols with state, in no particular order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }
}
