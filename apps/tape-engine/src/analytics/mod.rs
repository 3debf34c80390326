//! In-memory trade analytics.
//!
//! The ingestor applies each stored trade here exactly once; presenters
//! read snapshots and resampled bars. All figures are derived from event
//! time and exact decimal arithmetic, so a replay of the same trades
//! produces the same numbers.

pub mod bars;
pub mod engine;
pub mod window;

pub use bars::{Bar, Tape, TapePoint};
pub use engine::{
    AnalyticsConfig, AnalyticsEngine, AnalyticsError, AnalyticsSnapshot, SharedAnalytics,
    SymbolAnalytics,
};
pub use window::RollingWindow;
