//! Websocket trade feed client.
//!
//! Holds exactly one live connection to the upstream feed. The client does
//! framing only: text frames become [`RawMessage`]s, pings are answered,
//! and any transport failure surfaces as a typed [`FeedError`] instead of
//! crashing the process. Reconnection is driven by the ingestor.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{FeedError, RawMessage, TradeFeed, TradeStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Feed connection configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Websocket endpoint base, e.g. `wss://stream.binance.com:9443/ws`.
    pub endpoint: String,
    /// Symbol to stream trades for.
    pub symbol: String,
}

impl FeedConfig {
    /// Full stream URL for the configured symbol's trade channel.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("{}/{}@trade", self.endpoint, self.symbol.to_lowercase())
    }
}

/// Websocket implementation of the trade feed port.
#[derive(Debug, Clone)]
pub struct WsFeedClient {
    config: FeedConfig,
}

impl WsFeedClient {
    /// Create a client for the configured endpoint and symbol.
    #[must_use]
    pub const fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// The configured stream URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.config.stream_url()
    }
}

#[async_trait]
impl TradeFeed for WsFeedClient {
    async fn connect(&self) -> Result<Box<dyn TradeStream>, FeedError> {
        let url = self.config.stream_url();
        debug!(url = %url, "Opening feed connection");

        let (ws_stream, _) =
            connect_async(&url)
                .await
                .map_err(|e| FeedError::ConnectionFailed {
                    message: e.to_string(),
                })?;

        let (write, read) = ws_stream.split();
        Ok(Box::new(WsTradeStream { write, read }))
    }
}

/// One open websocket stream session.
pub struct WsTradeStream {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

#[async_trait]
impl TradeStream for WsTradeStream {
    async fn next_message(&mut self) -> Result<RawMessage, FeedError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(RawMessage::new(text)),
                Some(Ok(Message::Ping(payload))) => {
                    self.write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| FeedError::SendFailed {
                            message: e.to_string(),
                        })?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "close frame".to_string());
                    return Err(FeedError::StreamClosed { reason });
                }
                Some(Ok(_)) => {
                    // Binary and pong frames are not part of the trade channel.
                }
                Some(Err(e)) => {
                    return Err(FeedError::StreamClosed {
                        reason: e.to_string(),
                    });
                }
                None => {
                    return Err(FeedError::StreamClosed {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_lowercases_symbol() {
        let config = FeedConfig {
            endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            symbol: "BTCUSDT".to_string(),
        };

        assert_eq!(
            config.stream_url(),
            "wss://stream.binance.com:9443/ws/btcusdt@trade"
        );
    }
}
