//! Feed-to-store-to-analytics ingestion loop.
//!
//! The ingestor owns the connection lifecycle: it connects, streams until
//! the feed drops, then waits out the retry delay and connects again, with
//! no terminal failure state. Each decoded trade is written to the event
//! store first and applied to the analytics engine only when the store
//! reports a fresh row, so a replayed message after a reconnect can never
//! count twice.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analytics::SharedAnalytics;
use crate::feed::codec::parse_trade;
use crate::feed::{FeedError, RetryPolicy, TradeFeed, TradeStream};
use crate::store::{EventStore, InsertOutcome, StoreError};

/// Trades between progress log lines.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No connection; waiting out the retry delay.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Messages are flowing.
    Streaming,
}

/// Running totals for one ingestor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    /// Messages received from the feed, including non-trade frames.
    pub received: u64,
    /// Trades stored as new rows.
    pub stored: u64,
    /// Trades skipped because the store already held them.
    pub duplicates: u64,
    /// Trades stored but rejected by the analytics engine as out of order.
    pub rejected: u64,
    /// Messages that failed to decode.
    pub decode_errors: u64,
    /// Completed reconnects after the first successful connection.
    pub reconnects: u64,
}

/// Ingestor tuning.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Symbol this ingestor owns.
    pub symbol: String,
    /// Base delay between reconnect attempts.
    pub retry_delay: Duration,
    /// Rows replayed from the store before the first connection.
    pub replay_limit: u32,
}

/// Drives one symbol's feed into the store and the analytics engine.
pub struct Ingestor<F, S> {
    feed: F,
    store: S,
    analytics: SharedAnalytics,
    config: IngestConfig,
    retry: RetryPolicy,
    state: IngestState,
    counters: IngestCounters,
}

impl<F, S> Ingestor<F, S>
where
    F: TradeFeed,
    S: EventStore,
{
    /// Create an ingestor over the given feed, store, and analytics engine.
    #[must_use]
    pub fn new(feed: F, store: S, analytics: SharedAnalytics, config: IngestConfig) -> Self {
        let retry = RetryPolicy::new(config.retry_delay);
        Self {
            feed,
            store,
            analytics,
            config,
            retry,
            state: IngestState::Disconnected,
            counters: IngestCounters::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> IngestState {
        self.state
    }

    /// Running totals so far.
    #[must_use]
    pub const fn counters(&self) -> IngestCounters {
        self.counters
    }

    /// Run until cancelled.
    ///
    /// Replays recent stored trades into the analytics engine, then loops:
    /// connect, stream until the feed drops, wait out the retry delay,
    /// reconnect. Feed and store failures alike are logged and retried,
    /// never returned; a store outage at startup delays the warm-start
    /// replay the same way a dead feed delays streaming.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut replayed = false;
        let mut connected_once = false;
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if !replayed {
                match self.replay_recent().await {
                    Ok(()) => replayed = true,
                    Err(e) => {
                        warn!(
                            symbol = %self.config.symbol,
                            error = %e,
                            "Warm-start replay failed, retrying"
                        );
                        self.state = IngestState::Disconnected;
                        if self.backoff(&shutdown).await {
                            continue;
                        }
                        break;
                    }
                }
            }

            self.state = IngestState::Connecting;
            match self.feed.connect().await {
                Ok(stream) => {
                    if connected_once {
                        self.counters.reconnects += 1;
                    }
                    connected_once = true;
                    self.retry.reset();
                    self.state = IngestState::Streaming;
                    info!(symbol = %self.config.symbol, "Feed connected");

                    self.stream_session(stream, &shutdown).await;
                }
                Err(e) => {
                    warn!(
                        symbol = %self.config.symbol,
                        attempt = self.retry.attempt() + 1,
                        error = %e,
                        "Feed connection failed"
                    );
                }
            }

            self.state = IngestState::Disconnected;
            if shutdown.is_cancelled() {
                break;
            }
            if !self.backoff(&shutdown).await {
                break;
            }
        }

        info!(
            symbol = %self.config.symbol,
            stored = self.counters.stored,
            duplicates = self.counters.duplicates,
            reconnects = self.counters.reconnects,
            "Ingestor stopped"
        );
    }

    /// Wait out the retry delay; false when shutdown interrupts the wait.
    async fn backoff(&mut self, shutdown: &CancellationToken) -> bool {
        let delay = self.retry.next_delay();
        debug!(symbol = %self.config.symbol, delay_ms = delay.as_millis(), "Retry scheduled");
        tokio::select! {
            () = shutdown.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Rebuild analytics from the most recent stored trades.
    async fn replay_recent(&mut self) -> Result<(), StoreError> {
        let trades = self
            .store
            .query_recent(&self.config.symbol, self.config.replay_limit)
            .await?;
        if trades.is_empty() {
            return Ok(());
        }

        let mut analytics = self.analytics.write();
        let mut replayed = 0_u64;
        for trade in &trades {
            match analytics.apply(trade) {
                Ok(()) => replayed += 1,
                Err(e) => warn!(symbol = %self.config.symbol, error = %e, "Replay skipped a trade"),
            }
        }
        info!(symbol = %self.config.symbol, replayed, "Warm start complete");
        Ok(())
    }

    /// Pump one connection until it drops or shutdown is requested.
    async fn stream_session(
        &mut self,
        mut stream: Box<dyn TradeStream>,
        shutdown: &CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                () = shutdown.cancelled() => return,
                message = stream.next_message() => message,
            };

            match message {
                Ok(raw) => {
                    if let Err(e) = self.process_message(raw.as_str()).await {
                        error!(symbol = %self.config.symbol, error = %e, "Store write failed, dropping connection");
                        return;
                    }
                }
                Err(FeedError::StreamClosed { reason }) => {
                    warn!(symbol = %self.config.symbol, reason = %reason, "Feed stream closed");
                    return;
                }
                Err(e) => {
                    warn!(symbol = %self.config.symbol, error = %e, "Feed stream failed");
                    return;
                }
            }
        }
    }

    /// Decode, store, and apply one raw message.
    ///
    /// Decode failures and non-trade frames are counted and skipped; only
    /// store failures propagate, ending the session.
    async fn process_message(&mut self, raw: &str) -> Result<(), StoreError> {
        self.counters.received += 1;
        if self.counters.received % PROGRESS_INTERVAL == 0 {
            info!(
                symbol = %self.config.symbol,
                received = self.counters.received,
                stored = self.counters.stored,
                duplicates = self.counters.duplicates,
                "Ingest progress"
            );
        }

        let trade = match parse_trade(raw, &self.config.symbol) {
            Ok(Some(trade)) => trade,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.counters.decode_errors += 1;
                warn!(symbol = %self.config.symbol, error = %e, "Undecodable message skipped");
                return Ok(());
            }
        };

        match self.store.insert(&trade).await? {
            InsertOutcome::Inserted => {
                self.counters.stored += 1;
                // Only fresh rows reach the analytics engine; a redelivered
                // trade has already been counted.
                if let Err(e) = self.analytics.write().apply(&trade) {
                    self.counters.rejected += 1;
                    warn!(symbol = %self.config.symbol, error = %e, "Trade stored but not aggregated");
                }
            }
            InsertOutcome::Duplicate => {
                self.counters.duplicates += 1;
            }
        }
        Ok(())
    }
}
