//! Ingestion Pipeline Integration Tests
//!
//! Drives the ingestor with a scripted feed through disconnects and
//! redelivery, asserting on the store and analytics state afterwards.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use tape_engine::analytics::{AnalyticsConfig, AnalyticsEngine, SharedAnalytics};
use tape_engine::feed::{FeedError, RawMessage, TradeFeed, TradeStream};
use tape_engine::ingest::{IngestConfig, IngestCounters, IngestState, Ingestor};
use tape_engine::store::{EventStore, InsertOutcome, SqliteEventStore, StoreError};
use tape_engine::trade::Trade;

/// Feed that replays scripted sessions, then cancels the shutdown token.
///
/// Each connect hands out the next session's messages; when the session is
/// exhausted the stream reports a close, which sends the ingestor back
/// through its reconnect path. Once every session has been played, the next
/// connect attempt requests shutdown so the test can join the run loop.
struct ScriptedFeed {
    sessions: Mutex<VecDeque<Vec<String>>>,
    shutdown: CancellationToken,
}

impl ScriptedFeed {
    fn new(sessions: Vec<Vec<&str>>, shutdown: CancellationToken) -> Self {
        let sessions = sessions
            .into_iter()
            .map(|s| s.into_iter().map(str::to_string).collect())
            .collect();
        Self {
            sessions: Mutex::new(sessions),
            shutdown,
        }
    }
}

#[async_trait]
impl TradeFeed for ScriptedFeed {
    async fn connect(&self) -> Result<Box<dyn TradeStream>, FeedError> {
        let next = self.sessions.lock().pop_front();
        match next {
            Some(messages) => Ok(Box::new(ScriptedStream {
                messages: messages.into(),
            })),
            None => {
                self.shutdown.cancel();
                Err(FeedError::ConnectionFailed {
                    message: "script exhausted".to_string(),
                })
            }
        }
    }
}

struct ScriptedStream {
    messages: VecDeque<String>,
}

#[async_trait]
impl TradeStream for ScriptedStream {
    async fn next_message(&mut self) -> Result<RawMessage, FeedError> {
        match self.messages.pop_front() {
            Some(message) => Ok(RawMessage::new(message)),
            None => Err(FeedError::StreamClosed {
                reason: "scripted disconnect".to_string(),
            }),
        }
    }
}

/// Store wrapper whose reads fail a fixed number of times, then recover.
struct FlakyStore {
    inner: SqliteEventStore,
    read_failures: Mutex<u32>,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn insert(&self, trade: &Trade) -> Result<InsertOutcome, StoreError> {
        self.inner.insert(trade).await
    }

    async fn query_recent(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, StoreError> {
        {
            let mut failures = self.read_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Query("simulated outage".to_string()));
            }
        }
        self.inner.query_recent(symbol, limit).await
    }
}

fn ts(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn trade_json(id: u64, price: &str, qty: &str, millis: i64) -> String {
    format!(r#"{{"e":"trade","s":"BTCUSDT","t":{id},"p":"{price}","q":"{qty}","T":{millis}}}"#)
}

fn test_config() -> IngestConfig {
    IngestConfig {
        symbol: "BTCUSDT".to_string(),
        retry_delay: Duration::from_millis(1),
        replay_limit: 100,
    }
}

async fn run_pipeline(
    sessions: Vec<Vec<&str>>,
    store: SqliteEventStore,
    analytics: SharedAnalytics,
) -> (IngestState, IngestCounters) {
    let shutdown = CancellationToken::new();
    let feed = ScriptedFeed::new(sessions, shutdown.clone());
    let mut ingestor = Ingestor::new(feed, store, analytics, test_config());

    ingestor.run(shutdown).await;
    (ingestor.state(), ingestor.counters())
}

#[tokio::test]
async fn redelivered_trades_are_stored_and_counted_once() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());

    let s1 = vec![
        trade_json(1, "100", "1", 1_000),
        trade_json(2, "101", "2", 2_000),
        trade_json(3, "100", "1", 3_000),
    ];
    let s2 = vec![
        // The feed redelivers the last two trades after the reconnect.
        trade_json(2, "101", "2", 2_000),
        trade_json(3, "100", "1", 3_000),
        trade_json(4, "102", "1", 4_000),
        trade_json(5, "103", "2", 5_000),
    ];
    let sessions = vec![
        s1.iter().map(String::as_str).collect(),
        s2.iter().map(String::as_str).collect(),
    ];

    let (state, counters) = run_pipeline(sessions, store.clone(), analytics.clone()).await;

    assert_eq!(state, IngestState::Disconnected);
    assert_eq!(counters.received, 7);
    assert_eq!(counters.stored, 5);
    assert_eq!(counters.duplicates, 2);
    assert_eq!(counters.reconnects, 1);
    assert_eq!(counters.decode_errors, 0);

    assert_eq!(store.count("BTCUSDT").await.unwrap(), 5);

    let snap = analytics.read().snapshot("BTCUSDT").unwrap();
    assert_eq!(snap.trade_count, 5);
    // Each trade aggregated exactly once despite the redelivery:
    // (100 + 202 + 100 + 102 + 206) / 7
    assert_eq!(snap.vwap, dec!(710) / dec!(7));
}

#[tokio::test]
async fn undecodable_messages_are_skipped_without_ending_the_session() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());

    let good = trade_json(1, "100", "1", 1_000);
    let after = trade_json(2, "101", "1", 2_000);
    let sessions = vec![vec![
        good.as_str(),
        "not json at all",
        r#"{"e":"trade","t":3}"#,
        r#"{"e":"aggTrade","t":9,"p":"1","q":"1","T":1}"#,
        after.as_str(),
    ]];

    let (_, counters) = run_pipeline(sessions, store.clone(), analytics.clone()).await;

    assert_eq!(counters.received, 5);
    assert_eq!(counters.stored, 2);
    assert_eq!(counters.decode_errors, 2);
    assert_eq!(store.count("BTCUSDT").await.unwrap(), 2);
}

#[tokio::test]
async fn out_of_order_trade_is_stored_but_not_aggregated() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());

    let msgs = vec![
        trade_json(1, "100", "1", 5_000),
        // Older event time than the trade above.
        trade_json(2, "999", "9", 4_000),
    ];
    let sessions = vec![msgs.iter().map(String::as_str).collect()];

    let (_, counters) = run_pipeline(sessions, store.clone(), analytics.clone()).await;

    // Both rows are durable, only the in-order one reached the figures.
    assert_eq!(counters.stored, 2);
    assert_eq!(counters.rejected, 1);
    assert_eq!(store.count("BTCUSDT").await.unwrap(), 2);

    let snap = analytics.read().snapshot("BTCUSDT").unwrap();
    assert_eq!(snap.trade_count, 1);
    assert_eq!(snap.vwap, dec!(100));
}

#[tokio::test]
async fn warm_start_replays_stored_trades_into_analytics() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());

    // Seed the store through a first run.
    let seed = vec![
        trade_json(1, "100", "1", 1_000),
        trade_json(2, "104", "3", 2_000),
    ];
    let sessions = vec![seed.iter().map(String::as_str).collect()];
    run_pipeline(sessions, store.clone(), analytics.clone()).await;

    // A fresh engine with no feed traffic rebuilds figures from the store.
    let fresh = AnalyticsEngine::shared(AnalyticsConfig::default());
    let (_, counters) = run_pipeline(Vec::new(), store.clone(), fresh.clone()).await;

    assert_eq!(counters.received, 0);
    let snap = fresh.read().snapshot("BTCUSDT").unwrap();
    assert_eq!(snap.trade_count, 2);
    assert_eq!(snap.vwap, dec!(103));
    assert_eq!(snap.last_price, dec!(104));
}

#[tokio::test]
async fn replay_outage_is_retried_not_fatal() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    store
        .insert(&Trade::new(1, "BTCUSDT", dec!(100), dec!(1), ts(1_000)))
        .await
        .unwrap();
    store
        .insert(&Trade::new(2, "BTCUSDT", dec!(102), dec!(2), ts(2_000)))
        .await
        .unwrap();

    // The first two replay reads fail as if the database were unreachable.
    let flaky = FlakyStore {
        inner: store.clone(),
        read_failures: Mutex::new(2),
    };

    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());
    let shutdown = CancellationToken::new();
    let next = trade_json(3, "104", "1", 3_000);
    let feed = ScriptedFeed::new(vec![vec![next.as_str()]], shutdown.clone());
    let mut ingestor = Ingestor::new(feed, flaky, analytics.clone(), test_config());

    tokio::time::timeout(Duration::from_secs(5), ingestor.run(shutdown))
        .await
        .expect("replay should recover after the outage");

    // Both stored trades were eventually replayed and streaming proceeded.
    let snap = analytics.read().snapshot("BTCUSDT").unwrap();
    assert_eq!(snap.trade_count, 3);
    assert_eq!(ingestor.counters().stored, 1);
}

#[tokio::test]
async fn warm_start_survives_an_unmappable_row() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    store
        .insert(&Trade::new(1, "BTCUSDT", dec!(100), dec!(1), ts(1_000)))
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO trade_data (symbol, trade_id, price, quantity, trade_time)
         VALUES ('BTCUSDT', 2, 'garbage', '1', 2000)",
    )
    .execute(store.pool())
    .await
    .unwrap();
    store
        .insert(&Trade::new(3, "BTCUSDT", dec!(101), dec!(1), ts(3_000)))
        .await
        .unwrap();

    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());
    run_pipeline(Vec::new(), store.clone(), analytics.clone()).await;

    // The bad row is skipped; the mappable trades still warm the figures.
    let snap = analytics.read().snapshot("BTCUSDT").unwrap();
    assert_eq!(snap.trade_count, 2);
    assert_eq!(snap.last_price, dec!(101));
}

#[tokio::test]
async fn cancellation_stops_the_run_loop() {
    let store = SqliteEventStore::in_memory().await.unwrap();
    let analytics = AnalyticsEngine::shared(AnalyticsConfig::default());

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let feed = ScriptedFeed::new(Vec::new(), CancellationToken::new());
    let mut ingestor = Ingestor::new(feed, store, analytics, test_config());

    tokio::time::timeout(Duration::from_secs(1), ingestor.run(shutdown))
        .await
        .expect("run loop should exit promptly when cancelled");
    assert_eq!(ingestor.counters(), IngestCounters::default());
}
