//! SQLite implementation of the event store.
//!
//! Prices and quantities round-trip as exact decimal text; event time is
//! stored as integer epoch milliseconds so ordering and bucketing are
//! integer comparisons.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use super::{EventStore, InsertOutcome, StoreError};
use crate::trade::Trade;

/// Maximum pooled connections for a file-backed database.
const MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed trade event log.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(url = %url, "Event store opened");
        Ok(store)
    }

    /// Open an in-memory database, for tests and local experiments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A pooled in-memory database must stay on one connection or each
        // checkout would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Total rows stored for a symbol.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the count query fails.
    pub async fn count(&self, symbol: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trade_data WHERE symbol = ?1")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let n: i64 = row
            .try_get("n")
            .map_err(|e| StoreError::Corrupt(format!("n: {e}")))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trade_data (
                symbol     TEXT    NOT NULL,
                trade_id   INTEGER NOT NULL,
                price      TEXT    NOT NULL,
                quantity   TEXT    NOT NULL,
                trade_time INTEGER NOT NULL,
                PRIMARY KEY (symbol, trade_id)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trade_data_time ON trade_data (symbol, trade_time)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    fn row_to_trade(row: &SqliteRow) -> Result<Trade, StoreError> {
        let id: i64 = row
            .try_get("trade_id")
            .map_err(|e| StoreError::Corrupt(format!("trade_id: {e}")))?;
        let id = u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("trade_id: {id}")))?;

        let symbol: String = row
            .try_get("symbol")
            .map_err(|e| StoreError::Corrupt(format!("symbol: {e}")))?;

        let price: String = row
            .try_get("price")
            .map_err(|e| StoreError::Corrupt(format!("price: {e}")))?;
        let price =
            Decimal::from_str(&price).map_err(|_| StoreError::Corrupt(format!("price: {price}")))?;

        let quantity: String = row
            .try_get("quantity")
            .map_err(|e| StoreError::Corrupt(format!("quantity: {e}")))?;
        let quantity = Decimal::from_str(&quantity)
            .map_err(|_| StoreError::Corrupt(format!("quantity: {quantity}")))?;

        let millis: i64 = row
            .try_get("trade_time")
            .map_err(|e| StoreError::Corrupt(format!("trade_time: {e}")))?;
        let time: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::Corrupt(format!("trade_time: {millis}")))?;

        Ok(Trade::new(id, symbol, price, quantity, time))
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert(&self, trade: &Trade) -> Result<InsertOutcome, StoreError> {
        let id = i64::try_from(trade.id)
            .map_err(|_| StoreError::Query(format!("trade id out of range: {}", trade.id)))?;

        let result = sqlx::query(
            r"
            INSERT INTO trade_data (symbol, trade_id, price, quantity, trade_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (symbol, trade_id) DO NOTHING
            ",
        )
        .bind(&trade.symbol)
        .bind(id)
        .bind(trade.price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.time_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            debug!(symbol = %trade.symbol, trade_id = trade.id, "Duplicate trade skipped");
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn query_recent(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT symbol, trade_id, price, quantity, trade_time
            FROM trade_data
            WHERE symbol = ?1
            ORDER BY trade_time DESC, trade_id DESC
            LIMIT ?2
            ",
        )
        .bind(symbol)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_trade(row) {
                Ok(trade) => trades.push(trade),
                // One unmappable row must not take down replay or the read
                // paths; the row stays in the table for inspection.
                Err(e) => warn!(symbol = %symbol, error = %e, "Skipping unmappable row"),
            }
        }

        // The query walks newest-first to honor the limit; callers want
        // oldest-first for replay.
        trades.reverse();
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(id: u64, price: Decimal, millis: i64) -> Trade {
        Trade::new(
            id,
            "BTCUSDT",
            price,
            dec!(1),
            DateTime::from_timestamp_millis(millis).unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let t = trade(1, dec!(100.5), 1_000);

        assert_eq!(store.insert(&t).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&t).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.count("BTCUSDT").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_id_different_symbol_is_not_a_duplicate() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let mut t = trade(1, dec!(100), 1_000);
        assert_eq!(store.insert(&t).await.unwrap(), InsertOutcome::Inserted);

        t.symbol = "ETHUSDT".to_string();
        assert_eq!(store.insert(&t).await.unwrap(), InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn query_recent_orders_by_event_time_ascending() {
        let store = SqliteEventStore::in_memory().await.unwrap();

        // Inserted out of event-time order on purpose.
        store.insert(&trade(3, dec!(103), 3_000)).await.unwrap();
        store.insert(&trade(1, dec!(101), 1_000)).await.unwrap();
        store.insert(&trade(2, dec!(102), 2_000)).await.unwrap();

        let trades = store.query_recent("BTCUSDT", 10).await.unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn query_recent_keeps_most_recent_rows() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        for i in 1..=5 {
            store
                .insert(&trade(i, dec!(100), i64::try_from(i).unwrap() * 1_000))
                .await
                .unwrap();
        }

        let trades = store.query_recent("BTCUSDT", 2).await.unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn equal_timestamps_tie_break_on_trade_id() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        store.insert(&trade(2, dec!(100), 1_000)).await.unwrap();
        store.insert(&trade(1, dec!(100), 1_000)).await.unwrap();

        let trades = store.query_recent("BTCUSDT", 10).await.unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn unmappable_rows_are_skipped_not_fatal() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        store.insert(&trade(1, dec!(100), 1_000)).await.unwrap();
        store.insert(&trade(3, dec!(102), 3_000)).await.unwrap();

        // Bypass the typed insert to plant a row with unparseable price text.
        sqlx::query(
            "INSERT INTO trade_data (symbol, trade_id, price, quantity, trade_time)
             VALUES ('BTCUSDT', 2, 'garbage', '1', 2000)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let trades = store.query_recent("BTCUSDT", 10).await.unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn decimal_values_roundtrip_exactly() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let t = Trade::new(
            9,
            "BTCUSDT",
            dec!(27123.00000001),
            dec!(0.00001500),
            DateTime::from_timestamp_millis(1_000).unwrap(),
        );
        store.insert(&t).await.unwrap();

        let stored = store.query_recent("BTCUSDT", 1).await.unwrap();
        assert_eq!(stored[0].price, dec!(27123.00000001));
        assert_eq!(stored[0].quantity, dec!(0.00001500));
    }
}
