//! Binance Wire Message Types
//!
//! Serde types mirroring Binance's JSON payloads, for both stream events and
//! REST snapshots, plus their conversion into domain types.
//!
//! # Stream Payloads
//!
//! | Stream           | Event (`e`)               | Domain type          |
//! |------------------|---------------------------|----------------------|
//! | `@trade`         | `trade`                   | `Trade`              |
//! | `@aggTrade`      | `aggTrade`                | `AggregateTrade`     |
//! | `@kline_<i>`     | `kline`                   | `CandlestickEvent`   |
//! | `@depth`         | `depthUpdate`             | `DepthUpdate`        |
//! | `@depth<n>`      | (none)                    | `OrderBook`          |
//! | `@ticker`        | `24hrTicker`              | `SymbolStatistics`   |
//! | listen key       | `outboundAccountPosition` | `AccountUpdate`      |
//! | listen key       | `balanceUpdate`           | `BalanceUpdate`      |
//! | listen key       | `executionReport`         | `OrderUpdate`        |
//!
//! Prices and quantities arrive as strings and are decoded straight into
//! `Decimal`; timestamps are epoch milliseconds.
//!
//! # References
//!
//! - [WebSocket Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)
//! - [User Data Stream](https://developers.binance.com/docs/binance-spot-api-docs/user-data-stream)
//! - [Market Data Endpoints](https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::CodecError;
use crate::domain::streaming::{
    AccountUpdate, AggregateTrade, Balance, BalanceUpdate, Candlestick, CandlestickEvent,
    CandlestickInterval, DepthUpdate, OrderBook, OrderBookLevel, OrderUpdate, SymbolStatistics,
    Trade,
};

/// Price level as sent on the wire: `["price", "quantity"]`.
pub type WireLevel = (Decimal, Decimal);

fn timestamp(field: &'static str, millis: i64) -> Result<DateTime<Utc>, CodecError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| CodecError::InvalidValue {
        field,
        value: millis.to_string(),
    })
}

fn interval(value: &str) -> Result<CandlestickInterval, CodecError> {
    value.parse().map_err(|_| CodecError::InvalidValue {
        field: "interval",
        value: value.to_string(),
    })
}

fn levels(levels: Vec<WireLevel>) -> Vec<OrderBookLevel> {
    levels
        .into_iter()
        .map(|(price, quantity)| OrderBookLevel::new(price, quantity))
        .collect()
}

// =============================================================================
// Market Stream Events
// =============================================================================

/// `trade` event.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade ID.
    #[serde(rename = "t")]
    pub trade_id: u64,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// Trade time.
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Buyer is the maker.
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl TryFrom<TradeMessage> for Trade {
    type Error = CodecError;

    fn try_from(m: TradeMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: m.symbol,
            id: m.trade_id,
            price: m.price,
            quantity: m.quantity,
            time: timestamp("T", m.trade_time)?,
            is_buyer_maker: m.is_buyer_maker,
        })
    }
}

/// `aggTrade` event, also the element type of `GET /api/v3/aggTrades`
/// (which omits the symbol).
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateTradeMessage {
    /// Symbol (stream payloads only).
    #[serde(rename = "s", default)]
    pub symbol: String,
    /// Aggregate trade ID.
    #[serde(rename = "a")]
    pub aggregate_id: u64,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// First trade ID.
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    /// Last trade ID.
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    /// Trade time.
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Buyer is the maker.
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl AggregateTradeMessage {
    /// Convert to the domain type, filling in the symbol when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the trade time is out of range.
    pub fn into_domain(self, symbol: &str) -> Result<AggregateTrade, CodecError> {
        Ok(AggregateTrade {
            symbol: if self.symbol.is_empty() {
                symbol.to_string()
            } else {
                self.symbol
            },
            id: self.aggregate_id,
            price: self.price,
            quantity: self.quantity,
            first_trade_id: self.first_trade_id,
            last_trade_id: self.last_trade_id,
            time: timestamp("T", self.trade_time)?,
            is_buyer_maker: self.is_buyer_maker,
        })
    }
}

/// Candlestick payload nested in a `kline` event.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineData {
    /// Open time.
    #[serde(rename = "t")]
    pub open_time: i64,
    /// Close time.
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Interval.
    #[serde(rename = "i")]
    pub interval: String,
    /// Open price.
    #[serde(rename = "o")]
    pub open: Decimal,
    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Number of trades.
    #[serde(rename = "n")]
    pub trade_count: u64,
    /// Whether the candlestick is closed.
    #[serde(rename = "x")]
    pub is_final: bool,
    /// Quote asset volume.
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    /// Taker buy base asset volume.
    #[serde(rename = "V")]
    pub taker_buy_base_volume: Decimal,
    /// Taker buy quote asset volume.
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

/// `kline` event.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Candlestick.
    #[serde(rename = "k")]
    pub kline: KlineData,
}

impl TryFrom<KlineMessage> for CandlestickEvent {
    type Error = CodecError;

    fn try_from(m: KlineMessage) -> Result<Self, Self::Error> {
        let k = m.kline;
        Ok(Self {
            event_time: timestamp("E", m.event_time)?,
            is_final: k.is_final,
            candlestick: Candlestick {
                symbol: k.symbol,
                interval: interval(&k.interval)?,
                open_time: timestamp("t", k.open_time)?,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.volume,
                close_time: timestamp("T", k.close_time)?,
                quote_volume: k.quote_volume,
                trade_count: k.trade_count,
                taker_buy_base_volume: k.taker_buy_base_volume,
                taker_buy_quote_volume: k.taker_buy_quote_volume,
            },
        })
    }
}

/// `depthUpdate` event.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdateMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// First update ID.
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update ID.
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Changed bids.
    #[serde(rename = "b")]
    pub bids: Vec<WireLevel>,
    /// Changed asks.
    #[serde(rename = "a")]
    pub asks: Vec<WireLevel>,
}

impl TryFrom<DepthUpdateMessage> for DepthUpdate {
    type Error = CodecError;

    fn try_from(m: DepthUpdateMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: m.symbol,
            event_time: timestamp("E", m.event_time)?,
            first_update_id: m.first_update_id,
            final_update_id: m.final_update_id,
            bids: levels(m.bids),
            asks: levels(m.asks),
        })
    }
}

/// Partial depth payload, also the body of `GET /api/v3/depth`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookDepthMessage {
    /// Last update ID included.
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    /// Bids, best first.
    pub bids: Vec<WireLevel>,
    /// Asks, best first.
    pub asks: Vec<WireLevel>,
}

impl BookDepthMessage {
    /// Convert to an order book for `symbol`.
    #[must_use]
    pub fn into_domain(self, symbol: &str) -> OrderBook {
        OrderBook {
            symbol: symbol.to_string(),
            last_update_id: self.last_update_id,
            bids: levels(self.bids),
            asks: levels(self.asks),
        }
    }
}

/// `24hrTicker` event.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerMessage {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Price change.
    #[serde(rename = "p")]
    pub price_change: Decimal,
    /// Price change percent.
    #[serde(rename = "P")]
    pub price_change_percent: Decimal,
    /// Weighted average price.
    #[serde(rename = "w")]
    pub weighted_average_price: Decimal,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Last quantity.
    #[serde(rename = "Q")]
    pub last_quantity: Decimal,
    /// Best bid price.
    #[serde(rename = "b")]
    pub bid_price: Decimal,
    /// Best bid quantity.
    #[serde(rename = "B")]
    pub bid_quantity: Decimal,
    /// Best ask price.
    #[serde(rename = "a")]
    pub ask_price: Decimal,
    /// Best ask quantity.
    #[serde(rename = "A")]
    pub ask_quantity: Decimal,
    /// Open price.
    #[serde(rename = "o")]
    pub open_price: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high_price: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low_price: Decimal,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Quote asset volume.
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    /// Statistics open time.
    #[serde(rename = "O")]
    pub open_time: i64,
    /// Statistics close time.
    #[serde(rename = "C")]
    pub close_time: i64,
    /// First trade ID.
    #[serde(rename = "F")]
    pub first_trade_id: i64,
    /// Last trade ID.
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    /// Number of trades.
    #[serde(rename = "n")]
    pub trade_count: u64,
}

impl TryFrom<TickerMessage> for SymbolStatistics {
    type Error = CodecError;

    fn try_from(m: TickerMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: m.symbol,
            price_change: m.price_change,
            price_change_percent: m.price_change_percent,
            weighted_average_price: m.weighted_average_price,
            last_price: m.last_price,
            last_quantity: m.last_quantity,
            bid_price: m.bid_price,
            bid_quantity: m.bid_quantity,
            ask_price: m.ask_price,
            ask_quantity: m.ask_quantity,
            open_price: m.open_price,
            high_price: m.high_price,
            low_price: m.low_price,
            volume: m.volume,
            quote_volume: m.quote_volume,
            open_time: timestamp("O", m.open_time)?,
            close_time: timestamp("C", m.close_time)?,
            first_trade_id: m.first_trade_id,
            last_trade_id: m.last_trade_id,
            trade_count: m.trade_count,
        })
    }
}

// =============================================================================
// User Data Stream Events
// =============================================================================

/// Balance entry of an `outboundAccountPosition` event.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceMessage {
    /// Asset.
    #[serde(rename = "a")]
    pub asset: String,
    /// Free amount.
    #[serde(rename = "f")]
    pub free: Decimal,
    /// Locked amount.
    #[serde(rename = "l")]
    pub locked: Decimal,
}

/// `outboundAccountPosition` event.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPositionMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Time of last account update.
    #[serde(rename = "u")]
    pub last_update_time: i64,
    /// Changed balances.
    #[serde(rename = "B")]
    pub balances: Vec<BalanceMessage>,
}

impl TryFrom<AccountPositionMessage> for AccountUpdate {
    type Error = CodecError;

    fn try_from(m: AccountPositionMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            event_time: timestamp("E", m.event_time)?,
            last_update_time: timestamp("u", m.last_update_time)?,
            balances: m
                .balances
                .into_iter()
                .map(|b| Balance {
                    asset: b.asset,
                    free: b.free,
                    locked: b.locked,
                })
                .collect(),
        })
    }
}

/// `balanceUpdate` event.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceUpdateMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Asset.
    #[serde(rename = "a")]
    pub asset: String,
    /// Balance delta.
    #[serde(rename = "d")]
    pub delta: Decimal,
    /// Clear time.
    #[serde(rename = "T")]
    pub clear_time: i64,
}

impl TryFrom<BalanceUpdateMessage> for BalanceUpdate {
    type Error = CodecError;

    fn try_from(m: BalanceUpdateMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            event_time: timestamp("E", m.event_time)?,
            asset: m.asset,
            delta: m.delta,
            clear_time: timestamp("T", m.clear_time)?,
        })
    }
}

/// `executionReport` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReportMessage {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Client order ID.
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Side.
    #[serde(rename = "S")]
    pub side: String,
    /// Order type.
    #[serde(rename = "o")]
    pub order_type: String,
    /// Time in force.
    #[serde(rename = "f")]
    pub time_in_force: String,
    /// Order quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// Order price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Execution type.
    #[serde(rename = "x")]
    pub execution_type: String,
    /// Order status.
    #[serde(rename = "X")]
    pub status: String,
    /// Reject reason.
    #[serde(rename = "r")]
    pub reject_reason: String,
    /// Order ID.
    #[serde(rename = "i")]
    pub order_id: u64,
    /// Last executed quantity.
    #[serde(rename = "l")]
    pub last_executed_quantity: Decimal,
    /// Cumulative filled quantity.
    #[serde(rename = "z")]
    pub cumulative_quantity: Decimal,
    /// Last executed price.
    #[serde(rename = "L")]
    pub last_executed_price: Decimal,
    /// Commission amount.
    #[serde(rename = "n")]
    pub commission: Decimal,
    /// Commission asset.
    #[serde(rename = "N")]
    pub commission_asset: Option<String>,
    /// Transaction time.
    #[serde(rename = "T")]
    pub transaction_time: i64,
    /// Trade ID.
    #[serde(rename = "t")]
    pub trade_id: i64,
}

impl TryFrom<ExecutionReportMessage> for OrderUpdate {
    type Error = CodecError;

    fn try_from(m: ExecutionReportMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            event_time: timestamp("E", m.event_time)?,
            symbol: m.symbol,
            client_order_id: m.client_order_id,
            side: m.side,
            order_type: m.order_type,
            time_in_force: m.time_in_force,
            quantity: m.quantity,
            price: m.price,
            execution_type: m.execution_type,
            status: m.status,
            reject_reason: m.reject_reason,
            order_id: m.order_id,
            last_executed_quantity: m.last_executed_quantity,
            cumulative_quantity: m.cumulative_quantity,
            last_executed_price: m.last_executed_price,
            commission: m.commission,
            commission_asset: m.commission_asset,
            transaction_time: timestamp("T", m.transaction_time)?,
            trade_id: m.trade_id,
        })
    }
}

// =============================================================================
// REST Payloads
// =============================================================================

/// Element of `GET /api/v3/klines`: a positional array.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineRow(
    i64,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    i64,
    Decimal,
    u64,
    Decimal,
    Decimal,
    serde_json::Value,
);

impl KlineRow {
    /// Convert to a candlestick.
    ///
    /// # Errors
    ///
    /// Returns an error if a timestamp is out of range.
    pub fn into_domain(
        self,
        symbol: &str,
        interval: CandlestickInterval,
    ) -> Result<Candlestick, CodecError> {
        Ok(Candlestick {
            symbol: symbol.to_string(),
            interval,
            open_time: timestamp("openTime", self.0)?,
            open: self.1,
            high: self.2,
            low: self.3,
            close: self.4,
            volume: self.5,
            close_time: timestamp("closeTime", self.6)?,
            quote_volume: self.7,
            trade_count: self.8,
            taker_buy_base_volume: self.9,
            taker_buy_quote_volume: self.10,
        })
    }
}

/// Body of `GET /api/v3/ticker/24hr?symbol=...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResponse {
    /// Symbol.
    pub symbol: String,
    /// Price change.
    pub price_change: Decimal,
    /// Price change percent.
    pub price_change_percent: Decimal,
    /// Weighted average price.
    #[serde(rename = "weightedAvgPrice")]
    pub weighted_average_price: Decimal,
    /// Last price.
    pub last_price: Decimal,
    /// Last quantity.
    #[serde(rename = "lastQty")]
    pub last_quantity: Decimal,
    /// Best bid price.
    pub bid_price: Decimal,
    /// Best bid quantity.
    #[serde(rename = "bidQty")]
    pub bid_quantity: Decimal,
    /// Best ask price.
    pub ask_price: Decimal,
    /// Best ask quantity.
    #[serde(rename = "askQty")]
    pub ask_quantity: Decimal,
    /// Open price.
    pub open_price: Decimal,
    /// High price.
    pub high_price: Decimal,
    /// Low price.
    pub low_price: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
    /// Quote asset volume.
    pub quote_volume: Decimal,
    /// Statistics open time.
    pub open_time: i64,
    /// Statistics close time.
    pub close_time: i64,
    /// First trade ID.
    #[serde(rename = "firstId")]
    pub first_trade_id: i64,
    /// Last trade ID.
    #[serde(rename = "lastId")]
    pub last_trade_id: i64,
    /// Number of trades.
    #[serde(rename = "count")]
    pub trade_count: u64,
}

impl TryFrom<TickerResponse> for SymbolStatistics {
    type Error = CodecError;

    fn try_from(m: TickerResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: m.symbol,
            price_change: m.price_change,
            price_change_percent: m.price_change_percent,
            weighted_average_price: m.weighted_average_price,
            last_price: m.last_price,
            last_quantity: m.last_quantity,
            bid_price: m.bid_price,
            bid_quantity: m.bid_quantity,
            ask_price: m.ask_price,
            ask_quantity: m.ask_quantity,
            open_price: m.open_price,
            high_price: m.high_price,
            low_price: m.low_price,
            volume: m.volume,
            quote_volume: m.quote_volume,
            open_time: timestamp("openTime", m.open_time)?,
            close_time: timestamp("closeTime", m.close_time)?,
            first_trade_id: m.first_trade_id,
            last_trade_id: m.last_trade_id,
            trade_count: m.trade_count,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kline_row_decodes_positional_array() {
        let json = r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100",
            "148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397",
            "28.46694368","0"]"#;
        let row: KlineRow = serde_json::from_str(json).unwrap();
        let candle = row
            .into_domain("BTCUSDT", CandlestickInterval::Minute)
            .unwrap();

        assert_eq!(candle.open, Decimal::from_str("0.01634790").unwrap());
        assert_eq!(candle.trade_count, 308);
        assert_eq!(candle.open_time.timestamp_millis(), 1_499_040_000_000);
        assert_eq!(candle.symbol, "BTCUSDT");
    }

    #[test]
    fn aggregate_trade_without_symbol_uses_requested_symbol() {
        let json = r#"{"a":26129,"p":"0.01633102","q":"4.70443515","f":27781,"l":27781,
            "T":1498793709153,"m":true,"M":true}"#;
        let message: AggregateTradeMessage = serde_json::from_str(json).unwrap();
        let trade = message.into_domain("BNBBTC").unwrap();

        assert_eq!(trade.symbol, "BNBBTC");
        assert_eq!(trade.id, 26129);
        assert!(trade.is_buyer_maker);
    }

    #[test]
    fn ticker_response_decodes_camel_case() {
        let json = r#"{"symbol":"BNBBTC","priceChange":"-94.99999800","priceChangePercent":"-95.960",
            "weightedAvgPrice":"0.29628482","prevClosePrice":"0.10002000","lastPrice":"4.00000200",
            "lastQty":"200.00000000","bidPrice":"4.00000000","bidQty":"100.00000000",
            "askPrice":"4.00000200","askQty":"100.00000000","openPrice":"99.00000000",
            "highPrice":"100.00000000","lowPrice":"0.10000000","volume":"8913.30000000",
            "quoteVolume":"15.30000000","openTime":1499783499040,"closeTime":1499869899040,
            "firstId":28385,"lastId":28460,"count":76}"#;
        let response: TickerResponse = serde_json::from_str(json).unwrap();
        let stats = SymbolStatistics::try_from(response).unwrap();

        assert_eq!(stats.last_price, Decimal::from_str("4.00000200").unwrap());
        assert_eq!(stats.trade_count, 76);
        assert_eq!(stats.close_time.timestamp_millis(), 1_499_869_899_040);
    }

    #[test]
    fn kline_with_unknown_interval_is_rejected() {
        let json = r#"{"E":1,"k":{"t":0,"T":59999,"s":"BTCUSDT","i":"7m","o":"1","c":"1",
            "h":"1","l":"1","v":"1","n":1,"x":false,"q":"1","V":"0","Q":"0"}}"#;
        let message: KlineMessage = serde_json::from_str(json).unwrap();

        assert_eq!(
            CandlestickEvent::try_from(message),
            Err(CodecError::InvalidValue {
                field: "interval",
                value: "7m".to_string()
            })
        );
    }
}
