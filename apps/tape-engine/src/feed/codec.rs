//! Message parsing for the trade stream.
//!
//! The upstream feed delivers self-contained JSON objects per trade, with
//! short field names and numbers that may arrive either as JSON numbers or
//! as numeric strings. Parsing produces a typed [`Trade`] or a rejection;
//! nothing downstream touches dynamic JSON.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use crate::trade::Trade;

/// Errors from decoding a raw feed message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A required field was absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A numeric field could not be interpreted.
    #[error("invalid number in field `{field}`: {value}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Offending value as received.
        value: String,
    },

    /// The event timestamp is outside the representable range.
    #[error("invalid event timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// A numeric field that may arrive as a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn to_decimal(&self, field: &'static str) -> Result<Decimal, CodecError> {
        let invalid = |value: String| CodecError::InvalidNumber { field, value };
        match self {
            Self::Number(n) => Decimal::from_f64(*n).ok_or_else(|| invalid(n.to_string())),
            Self::Text(s) => Decimal::from_str(s).map_err(|_| invalid(s.clone())),
        }
    }
}

/// Raw trade event as delivered by the feed.
#[derive(Debug, Deserialize)]
struct RawTradeEvent {
    /// Event type discriminator ("trade" for trade events).
    #[serde(rename = "e")]
    event: Option<String>,
    /// Symbol, when the feed includes it.
    #[serde(rename = "s")]
    symbol: Option<String>,
    /// Exchange trade id.
    #[serde(rename = "t")]
    trade_id: Option<u64>,
    /// Price.
    #[serde(rename = "p")]
    price: Option<NumberOrString>,
    /// Quantity.
    #[serde(rename = "q")]
    quantity: Option<NumberOrString>,
    /// Event time in epoch milliseconds.
    #[serde(rename = "T")]
    trade_time: Option<i64>,
}

/// Parse a raw feed message into a trade.
///
/// Returns `Ok(None)` for well-formed control messages that are not trade
/// events (subscription acks, heartbeats). Messages claiming to be trades
/// but missing required fields are errors; the caller drops them.
///
/// # Errors
///
/// Returns [`CodecError`] when the payload is not valid JSON or a trade
/// event carries a missing or malformed field.
pub fn parse_trade(raw: &str, default_symbol: &str) -> Result<Option<Trade>, CodecError> {
    let event: RawTradeEvent =
        serde_json::from_str(raw).map_err(|e| CodecError::InvalidJson(e.to_string()))?;

    match event.event.as_deref() {
        Some("trade") => {}
        // Control messages (subscribe acks, pings) carry no event type or a
        // different one; they are not errors.
        _ => return Ok(None),
    }

    let id = event.trade_id.ok_or(CodecError::MissingField("t"))?;
    let price = event
        .price
        .ok_or(CodecError::MissingField("p"))?
        .to_decimal("p")?;
    let quantity = event
        .quantity
        .ok_or(CodecError::MissingField("q"))?
        .to_decimal("q")?;
    let millis = event.trade_time.ok_or(CodecError::MissingField("T"))?;
    let time: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
        .ok_or(CodecError::InvalidTimestamp(millis))?;

    let symbol = event
        .symbol
        .unwrap_or_else(|| default_symbol.to_uppercase());

    Ok(Some(Trade::new(id, symbol, price, quantity, time)))
}
