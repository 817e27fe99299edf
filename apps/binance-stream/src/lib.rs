#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Binance Stream - Market Data Subscription Core
//!
//! Multiplexes symbol/stream subscriptions onto Binance combined-stream
//! WebSocket connections, survives transport failures through a fixed-delay
//! retry controller, and keeps REST-seeded caches consistent with the live
//! event stream across reconnects.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types
//!   - `streaming`: Trades, candlesticks, order books, statistics, account events
//!   - `subscription`: Stream keys and the callback registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream transport, snapshot provider, stream client capability
//!   - `services`: Task controllers, stream client adapters, synchronized caches
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket transport, REST snapshots, codec, clients, manager
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OpenTelemetry export
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────────┐
//! subscribe ────────►│ StreamClient-    │──► cancel / mutate registry / begin
//!                    │ Adapter          │
//!                    └────────┬─────────┘
//!                             │ RetryTaskController
//!                             ▼
//! Binance WS ──► StreamTransport ──► StreamClient::handle_message ──► callbacks
//!                                                                      │
//! Binance REST ──► SnapshotProvider ──► SynchronizedCache ◄────────────┘
//!                                             │
//!                                             ▼
//!                                      view callback (Arc)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    AggregateTrade, Candlestick, CandlestickEvent, CandlestickInterval, DepthEvent, DepthUpdate,
    OrderBook, OrderBookLevel, SymbolStatistics, Trade, UserDataEvent,
};
pub use domain::subscription::{Callback, StreamKey, StreamKind, SymbolError};

// Ports
pub use application::ports::{
    CodecError, MessageStream, SnapshotError, SnapshotProvider, StreamClient, StreamTransport,
    TransportError,
};

// Services
pub use application::services::cache::{CacheError, CacheView, SynchronizedCache, ViewCallback};
pub use application::services::{
    ConnectionEvent, RetryTaskController, StreamClientAdapter, StreamError, TaskController,
    TaskError, TaskEvent,
};

// Binance adapters
pub use infrastructure::binance::{
    AggregateTradeCache, BinanceRestClient, CandlestickCache, OrderBookCache, StatisticsCache,
    WebSocketClientManager, WebSocketTransport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
