//! Binance Adapters
//!
//! Concrete implementations of the application ports for Binance Spot:
//!
//! - `transport`: combined-stream WebSocket transport
//! - `rest`: public market data REST snapshots
//! - `codec` / `messages`: JSON payload decoding
//! - `clients`: one stream client per stream kind
//! - `manager`: adapters for every client behind one facade

pub mod clients;
pub mod codec;
pub mod manager;
pub mod messages;
pub mod rest;
pub mod transport;

pub use clients::{
    AggregateTradeClient, CandlestickClient, DepthClient, StatisticsClient, TradeClient,
    UserDataClient,
};
pub use manager::WebSocketClientManager;
pub use rest::{BinanceRestClient, DEFAULT_REST_URL, RestConfig};
pub use transport::{DEFAULT_STREAM_URL, WebSocketConfig, WebSocketTransport};

use crate::application::services::cache::{
    AggregateTradeView, CandlestickView, OrderBookView, StatisticsView, SynchronizedCache,
};

/// Candlestick window kept in sync with `<symbol>@kline_<interval>`.
pub type CandlestickCache = SynchronizedCache<CandlestickView, CandlestickClient>;

/// Order book kept in sync with `<symbol>@depth`.
pub type OrderBookCache = SynchronizedCache<OrderBookView, DepthClient>;

/// Aggregate trade window kept in sync with `<symbol>@aggTrade`.
pub type AggregateTradeCache = SynchronizedCache<AggregateTradeView, AggregateTradeClient>;

/// Rolling statistics kept in sync with `<symbol>@ticker`.
pub type StatisticsCache = SynchronizedCache<StatisticsView, StatisticsClient>;
