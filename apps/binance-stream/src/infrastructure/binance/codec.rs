//! Combined Stream Codec
//!
//! Connections opened on `/stream?streams=...` wrap every payload in an
//! envelope naming its stream:
//!
//! ```json
//! {"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1672515782136,...}}
//! ```
//!
//! The codec splits the envelope and decodes `data` by its `e` field.
//! Frames without a `stream` (e.g. `{"result":null,"id":1}` replies to live
//! subscription requests) carry no event and decode to `None`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::{
    AccountPositionMessage, AggregateTradeMessage, BalanceUpdateMessage, BookDepthMessage,
    DepthUpdateMessage, ExecutionReportMessage, KlineMessage, TickerMessage, TradeMessage,
};
use crate::application::ports::CodecError;
use crate::domain::streaming::{
    AggregateTrade, CandlestickEvent, DepthEvent, DepthUpdate, SymbolStatistics, Trade,
    UserDataEvent,
};

#[derive(Debug, Deserialize)]
struct Envelope {
    stream: Option<String>,
    #[serde(default)]
    data: Value,
}

/// A decoded envelope: stream name and raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// Stream the payload belongs to.
    pub stream: String,
    /// Payload.
    pub data: Value,
}

impl StreamFrame {
    /// Event type (`e` field) of the payload, if any.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.data.get("e").and_then(Value::as_str)
    }

    /// Symbol part of the stream name, uppercased (`btcusdt@depth5` → `BTCUSDT`).
    #[must_use]
    pub fn symbol(&self) -> String {
        self.stream
            .split('@')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    fn unexpected(&self) -> CodecError {
        CodecError::UnexpectedEvent {
            stream: self.stream.clone(),
            event: self.event_type().unwrap_or_default().to_string(),
        }
    }

    fn expect_event(&self, event: &str) -> Result<(), CodecError> {
        if self.event_type() == Some(event) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn payload<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        serde_json::from_value(self.data).map_err(json_error)
    }
}

fn json_error(error: serde_json::Error) -> CodecError {
    CodecError::Json {
        message: error.to_string(),
    }
}

/// Split a combined-stream envelope.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object.
pub fn decode_frame(raw: &str) -> Result<Option<StreamFrame>, CodecError> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(json_error)?;
    Ok(envelope.stream.map(|stream| StreamFrame {
        stream,
        data: envelope.data,
    }))
}

/// Decode a `trade` payload.
///
/// # Errors
///
/// Returns an error if the payload is not a well-formed trade.
pub fn decode_trade(frame: StreamFrame) -> Result<Trade, CodecError> {
    frame.expect_event("trade")?;
    Trade::try_from(frame.payload::<TradeMessage>()?)
}

/// Decode an `aggTrade` payload.
///
/// # Errors
///
/// Returns an error if the payload is not a well-formed aggregate trade.
pub fn decode_aggregate_trade(frame: StreamFrame) -> Result<AggregateTrade, CodecError> {
    frame.expect_event("aggTrade")?;
    let symbol = frame.symbol();
    frame
        .payload::<AggregateTradeMessage>()?
        .into_domain(&symbol)
}

/// Decode a `kline` payload.
///
/// # Errors
///
/// Returns an error if the payload is not a well-formed candlestick.
pub fn decode_candlestick(frame: StreamFrame) -> Result<CandlestickEvent, CodecError> {
    frame.expect_event("kline")?;
    CandlestickEvent::try_from(frame.payload::<KlineMessage>()?)
}

/// Decode a diff (`depthUpdate`) or partial depth payload.
///
/// # Errors
///
/// Returns an error if the payload is neither.
pub fn decode_depth(frame: StreamFrame) -> Result<DepthEvent, CodecError> {
    match frame.event_type() {
        Some("depthUpdate") => Ok(DepthEvent::Diff(DepthUpdate::try_from(
            frame.payload::<DepthUpdateMessage>()?,
        )?)),
        None if frame.data.get("lastUpdateId").is_some() => {
            let symbol = frame.symbol();
            Ok(DepthEvent::Partial(
                frame.payload::<BookDepthMessage>()?.into_domain(&symbol),
            ))
        }
        _ => Err(frame.unexpected()),
    }
}

/// Decode a `24hrTicker` payload.
///
/// # Errors
///
/// Returns an error if the payload is not well-formed statistics.
pub fn decode_statistics(frame: StreamFrame) -> Result<SymbolStatistics, CodecError> {
    frame.expect_event("24hrTicker")?;
    SymbolStatistics::try_from(frame.payload::<TickerMessage>()?)
}

/// Decode a user-data payload.
///
/// # Errors
///
/// Returns an error for unknown event types or malformed payloads.
pub fn decode_user_data(frame: StreamFrame) -> Result<UserDataEvent, CodecError> {
    match frame.event_type() {
        Some("outboundAccountPosition") => Ok(UserDataEvent::Account(
            frame.payload::<AccountPositionMessage>()?.try_into()?,
        )),
        Some("balanceUpdate") => Ok(UserDataEvent::Balance(
            frame.payload::<BalanceUpdateMessage>()?.try_into()?,
        )),
        Some("executionReport") => Ok(UserDataEvent::Order(
            frame.payload::<ExecutionReportMessage>()?.try_into()?,
        )),
        _ => Err(frame.unexpected()),
    }
}

// =============================================================================
// Tests
// =============================================================================
