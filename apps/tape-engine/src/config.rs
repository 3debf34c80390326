//! Environment-driven engine configuration.
//!
//! `DATABASE_URL` is the only required variable; everything else has a
//! default suited to a single-symbol session. An unset optional variable
//! falls back silently, but a set variable that fails to parse is a fatal
//! startup error rather than a silent default.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::analytics::AnalyticsConfig;
use crate::feed::FeedConfig;
use crate::ingest::IngestConfig;

/// Default websocket endpoint base.
const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";

/// Default streamed symbol.
const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Configuration errors, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable is set but does not parse.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The unparseable value as found.
        value: String,
    },
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database URL for the event store.
    pub database_url: String,
    /// Websocket endpoint base.
    pub feed_endpoint: String,
    /// Symbol to stream.
    pub symbol: String,
    /// Base delay between reconnect attempts.
    pub retry_delay: Duration,
    /// Number of recent prices in the volatility window.
    pub window_size: usize,
    /// Number of per-trade points retained on the bar tape.
    pub tape_depth: usize,
    /// Rows replayed from the store at startup.
    pub replay_limit: u32,
    /// Bar bucket width.
    pub bar_bucket: Duration,
    /// Interval between snapshot log lines.
    pub snapshot_interval: Duration,
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `DATABASE_URL` is unset or any set
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            feed_endpoint: optional("TAPE_FEED_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            symbol: optional("TAPE_SYMBOL")
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string())
                .to_uppercase(),
            retry_delay: Duration::from_millis(parsed("TAPE_RETRY_DELAY_MS", 5_000)?),
            window_size: parsed("TAPE_WINDOW_SIZE", 100)?,
            tape_depth: parsed("TAPE_DEPTH", 3_000)?,
            replay_limit: parsed("TAPE_REPLAY_LIMIT", 3_000)?,
            bar_bucket: Duration::from_millis(parsed("TAPE_BAR_BUCKET_MS", 1_000)?),
            snapshot_interval: Duration::from_millis(parsed("TAPE_SNAPSHOT_INTERVAL_MS", 2_000)?),
        })
    }

    /// Feed configuration slice.
    #[must_use]
    pub fn feed(&self) -> FeedConfig {
        FeedConfig {
            endpoint: self.feed_endpoint.clone(),
            symbol: self.symbol.clone(),
        }
    }

    /// Analytics sizing slice.
    #[must_use]
    pub const fn analytics(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            window_size: self.window_size,
            tape_depth: self.tape_depth,
        }
    }

    /// Ingestor tuning slice.
    #[must_use]
    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            symbol: self.symbol.clone(),
            retry_delay: self.retry_delay,
            replay_limit: self.replay_limit,
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
