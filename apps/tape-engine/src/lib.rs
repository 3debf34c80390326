// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Tape Engine - Trade Ingestion and Analytics Core
//!
//! Streams trade prints from an exchange websocket, appends them to a
//! deduplicating event log, and maintains incremental session analytics
//! (VWAP, signed flow, volatility bands, resampled bars) for read-side
//! consumers.
//!
//! # Architecture
//!
//! - [`feed`]: websocket transport, message decoding, reconnect delay policy
//! - [`store`]: durable idempotent event log keyed by `(symbol, trade_id)`
//! - [`analytics`]: per-symbol incremental figures and the bar tape
//! - [`ingest`]: the connect/stream/retry loop tying the three together
//! - [`config`]: environment-driven configuration
//!
//! The ingestor writes; presenters read snapshots and bars through
//! [`analytics::SharedAnalytics`]. The store is the source of truth: a
//! trade reaches the analytics engine only after it is durably inserted,
//! and only when the insert created a new row.

pub mod analytics;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod store;
pub mod trade;

pub use analytics::{AnalyticsEngine, AnalyticsSnapshot, SharedAnalytics};
pub use config::EngineConfig;
pub use feed::WsFeedClient;
pub use ingest::Ingestor;
pub use store::SqliteEventStore;
pub use trade::Trade;
