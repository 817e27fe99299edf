//! Order book and depth update types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price.
    pub price: Decimal,
    /// Quantity. Zero in a depth update removes the level.
    pub quantity: Decimal,
}

impl OrderBookLevel {
    /// Create a new level.
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Point-in-time order book.
///
/// Bids are sorted best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Symbol.
    pub symbol: String,
    /// Last update ID included in this book.
    pub last_update_id: u64,
    /// Bid levels, highest price first.
    pub bids: Vec<OrderBookLevel>,
    /// Ask levels, lowest price first.
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Best bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    /// Best ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }

    /// Mid price between best bid and best ask.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Spread between best ask and best bid.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Incremental depth update from the diff-depth stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    /// Symbol.
    pub symbol: String,
    /// Event time.
    pub event_time: DateTime<Utc>,
    /// First update ID in this event.
    pub first_update_id: u64,
    /// Final update ID in this event.
    pub final_update_id: u64,
    /// Changed bid levels.
    pub bids: Vec<OrderBookLevel>,
    /// Changed ask levels.
    pub asks: Vec<OrderBookLevel>,
}

/// Event raised by a depth stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthEvent {
    /// Top-of-book snapshot from a partial depth stream (`@depth5/10/20`).
    Partial(OrderBook),
    /// Incremental update from the diff-depth stream (`@depth`).
    Diff(DepthUpdate),
}

impl DepthEvent {
    /// Symbol the event belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Partial(book) => &book.symbol,
            Self::Diff(update) => &update.symbol,
        }
    }
}
