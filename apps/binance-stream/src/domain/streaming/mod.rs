//! Market Data Streaming Types
//!
//! Core domain types for market data: trades, aggregate trades, candlesticks,
//! order books, rolling statistics and user account events. These types are
//! codec-agnostic and represent the canonical internal representation of the
//! data carried by both REST snapshots and stream events.

mod account;
mod candlestick;
mod order_book;
mod statistics;
mod trade;

pub use account::{AccountUpdate, Balance, BalanceUpdate, OrderUpdate, UserDataEvent};
pub use candlestick::{Candlestick, CandlestickEvent, CandlestickInterval, IntervalParseError};
pub use order_book::{DepthEvent, DepthUpdate, OrderBook, OrderBookLevel};
pub use statistics::SymbolStatistics;
pub use trade::{AggregateTrade, Trade};
