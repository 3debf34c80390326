//! Durable, deduplicating trade event log.
//!
//! Every accepted trade is appended to the `trade_data` table before it is
//! handed to the analytics engine. The `(symbol, trade_id)` primary key
//! makes inserts idempotent: replaying the same message after a reconnect
//! is a defined no-op, never an error and never a duplicate row.

use async_trait::async_trait;
use thiserror::Error;

use crate::trade::Trade;

pub mod sqlite;

pub use sqlite::SqliteEventStore;

/// Errors from event store operations.
///
/// A duplicate insert is not an error; it is the [`InsertOutcome::Duplicate`]
/// success outcome. These variants cover real transport and integrity
/// failures, which the ingestor treats like a dropped feed connection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or opened.
    #[error("database connection error: {0}")]
    Connection(String),

    /// A query failed for a reason other than the dedup no-op.
    #[error("query error: {0}")]
    Query(String),

    /// A stored row could not be mapped back into a trade.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The trade was stored as a new row.
    Inserted,
    /// A row with the same `(symbol, trade_id)` already existed; nothing
    /// was written.
    Duplicate,
}

/// Port for the durable trade event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Idempotently append a trade.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or constraint failures unrelated
    /// to the dedup key.
    async fn insert(&self, trade: &Trade) -> Result<InsertOutcome, StoreError>;

    /// The most recent `limit` trades for a symbol, ordered by event time
    /// ascending (ties broken by trade id ascending).
    ///
    /// Ordering is by the event time carried on the trade, never wall-clock
    /// arrival, so downstream aggregation sees economically consistent
    /// ordering. Rows that cannot be mapped back into a trade are skipped
    /// with a warning rather than failing the whole read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query itself fails.
    async fn query_recent(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, StoreError>;
}
