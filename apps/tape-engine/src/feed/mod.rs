//! Trade feed client.
//!
//! Maintains a single live websocket connection to the upstream trade feed
//! and exposes raw messages to the ingest loop. The client performs framing
//! only; parsing into [`crate::trade::Trade`] lives in [`codec`], and all
//! reconnection policy is owned by the ingestor so retry behavior is
//! centralized in one place.

use async_trait::async_trait;
use thiserror::Error;

pub mod client;
pub mod codec;
pub mod retry;

pub use client::{FeedConfig, WsFeedClient};
pub use codec::CodecError;
pub use retry::RetryPolicy;

/// A single raw text frame received from the feed, not yet parsed.
#[derive(Debug, Clone)]
pub struct RawMessage(String);

impl RawMessage {
    /// Wrap a raw frame payload.
    #[must_use]
    pub const fn new(payload: String) -> Self {
        Self(payload)
    }

    /// Borrow the payload.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the message, returning the payload.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Transport-level feed errors.
///
/// Every variant is recoverable by the ingestor's reconnect cycle; none of
/// these crash the process.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The connection could not be established.
    #[error("feed connection failed: {message}")]
    ConnectionFailed {
        /// Error details.
        message: String,
    },

    /// The live stream ended or errored.
    #[error("feed stream closed: {reason}")]
    StreamClosed {
        /// Close reason.
        reason: String,
    },

    /// An outgoing control frame could not be sent.
    #[error("feed send failed: {message}")]
    SendFailed {
        /// Error details.
        message: String,
    },
}

/// Port for anything that can open a live trade stream.
///
/// The websocket client implements this for production; tests supply
/// scripted fakes to exercise the ingestor's failure handling.
#[async_trait]
pub trait TradeFeed: Send + Sync {
    /// Open a new live stream.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ConnectionFailed`] if the transport handshake
    /// does not complete.
    async fn connect(&self) -> Result<Box<dyn TradeStream>, FeedError>;
}

/// An open, ordered stream of raw feed messages.
#[async_trait]
pub trait TradeStream: Send {
    /// Receive the next raw message, suspending until one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::StreamClosed`] when the connection ends for any
    /// reason; the stream must not be polled again afterwards.
    async fn next_message(&mut self) -> Result<RawMessage, FeedError>;
}
