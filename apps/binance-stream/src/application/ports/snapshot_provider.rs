//! Snapshot Provider Port (Driven Port)
//!
//! Point-in-time REST snapshots used to seed the caches before live events
//! are applied.

use async_trait::async_trait;

use crate::domain::streaming::{
    AggregateTrade, Candlestick, CandlestickInterval, OrderBook, SymbolStatistics,
};

/// Snapshot error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Request could not be sent or the response not read.
    #[error("snapshot request failed: {message}")]
    Request {
        /// Error details.
        message: String,
    },

    /// Server answered with a non-success status.
    #[error("snapshot request returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Request weight exhausted (HTTP 429) or IP banned (HTTP 418).
    #[error("rate limited (HTTP {status}), retry after {retry_after_secs:?}s")]
    RateLimited {
        /// HTTP status code.
        status: u16,
        /// Value of the `Retry-After` header, if present.
        retry_after_secs: Option<u64>,
    },

    /// Response body could not be decoded.
    #[error("invalid snapshot payload: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// REST snapshot source.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Latest `limit` candlesticks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched.
    async fn candlesticks(
        &self,
        symbol: &str,
        interval: CandlestickInterval,
        limit: usize,
    ) -> Result<Vec<Candlestick>, SnapshotError>;

    /// Order book with up to `limit` levels per side.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched.
    async fn order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, SnapshotError>;

    /// Latest `limit` aggregate trades, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched.
    async fn aggregate_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggregateTrade>, SnapshotError>;

    /// Rolling 24h statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched.
    async fn statistics(&self, symbol: &str) -> Result<SymbolStatistics, SnapshotError>;
}
