//! Trade and aggregate trade types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single raw trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Symbol.
    pub symbol: String,
    /// Trade ID.
    pub id: u64,
    /// Trade price.
    pub price: Decimal,
    /// Trade quantity.
    pub quantity: Decimal,
    /// Trade time.
    pub time: DateTime<Utc>,
    /// Whether the buyer was the maker.
    pub is_buyer_maker: bool,
}

/// Trades aggregated by price, taker side and time.
///
/// Aggregate IDs are sequential per symbol, which lets consumers detect
/// missed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTrade {
    /// Symbol.
    pub symbol: String,
    /// Aggregate trade ID.
    pub id: u64,
    /// Price.
    pub price: Decimal,
    /// Quantity.
    pub quantity: Decimal,
    /// First raw trade ID.
    pub first_trade_id: u64,
    /// Last raw trade ID.
    pub last_trade_id: u64,
    /// Trade time.
    pub time: DateTime<Utc>,
    /// Whether the buyer was the maker.
    pub is_buyer_maker: bool,
}
