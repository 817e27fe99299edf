//! Domain Layer - Market data types and subscription bookkeeping.
//!
//! Pure types with serialization support; no I/O and no async.

/// Market data types (trades, candlesticks, depth, statistics, user data).
pub mod streaming;

/// Stream keys and the callback subscription registry.
pub mod subscription;
