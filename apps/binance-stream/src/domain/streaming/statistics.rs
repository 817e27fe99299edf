//! Rolling 24 hour symbol statistics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rolling window price change statistics for a symbol.
///
/// Every update is a complete replacement; `close_time` orders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStatistics {
    /// Symbol.
    pub symbol: String,
    /// Absolute price change over the window.
    pub price_change: Decimal,
    /// Relative price change in percent.
    pub price_change_percent: Decimal,
    /// Weighted average price.
    pub weighted_average_price: Decimal,
    /// Last traded price.
    pub last_price: Decimal,
    /// Last traded quantity.
    pub last_quantity: Decimal,
    /// Best bid price.
    pub bid_price: Decimal,
    /// Best bid quantity.
    pub bid_quantity: Decimal,
    /// Best ask price.
    pub ask_price: Decimal,
    /// Best ask quantity.
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
    /// Window open time.
    pub open_time: DateTime<Utc>,
    /// Window close time.
    pub close_time: DateTime<Utc>,
    /// First trade ID in the window.
    pub first_trade_id: i64,
    /// Last trade ID in the window.
    pub last_trade_id: i64,
    /// Number of trades in the window.
    pub trade_count: u64,
}
