//! Subscription Registry Types
//!
//! Domain types for tracking callback subscriptions to physical exchange
//! streams.
//!
//! # Design
//!
//! A subscription is a (symbol, stream kind, parameter) tuple plus a
//! callback. Tuples collapse onto a [`StreamKey`], and every key maps to
//! exactly one physical stream name (`btcusdt@kline_1m`, `btcusdt@depth`,
//! a user-data listen key, ...). Several callbacks may hang off one key;
//! the physical stream stays observed until the last one is removed.
//!
//! Callbacks are compared by `Arc` pointer identity, so subscribing the
//! same callback twice is a no-op and unsubscribing needs the same `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::streaming::CandlestickInterval;

// =============================================================================
// Types
// =============================================================================

/// Callback invoked with every event raised for a subscribed stream.
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Depth levels accepted by partial book depth streams.
pub const PARTIAL_DEPTH_LEVELS: [u32; 3] = [5, 10, 20];

/// Physical stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    /// Raw trades (`@trade`).
    Trade,
    /// Aggregate trades (`@aggTrade`).
    AggregateTrade,
    /// Candlesticks for an interval (`@kline_<interval>`).
    Candlestick(CandlestickInterval),
    /// Diff depth updates (`@depth`).
    Depth,
    /// Top-of-book snapshots (`@depth<levels>`).
    PartialDepth(u32),
    /// Rolling 24h statistics (`@ticker`).
    Statistics,
    /// User-data stream addressed by listen key.
    UserData,
}

impl StreamKind {
    /// Build a depth stream kind from an optional level count.
    ///
    /// `None` selects the diff depth stream.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::InvalidDepthLimit`] unless the level count is
    /// one of [`PARTIAL_DEPTH_LEVELS`].
    pub fn depth(levels: Option<u32>) -> Result<Self, SymbolError> {
        match levels {
            None => Ok(Self::Depth),
            Some(levels) if PARTIAL_DEPTH_LEVELS.contains(&levels) => {
                Ok(Self::PartialDepth(levels))
            }
            Some(levels) => Err(SymbolError::InvalidDepthLimit(levels)),
        }
    }

    /// Stream name suffix, without the leading `@`.
    #[must_use]
    pub fn suffix(&self) -> Option<String> {
        match self {
            Self::Trade => Some("trade".to_string()),
            Self::AggregateTrade => Some("aggTrade".to_string()),
            Self::Candlestick(interval) => Some(format!("kline_{interval}")),
            Self::Depth => Some("depth".to_string()),
            Self::PartialDepth(levels) => Some(format!("depth{levels}")),
            Self::Statistics => Some("ticker".to_string()),
            Self::UserData => None,
        }
    }
}

/// Symbol validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// Symbol was empty or whitespace.
    #[error("symbol must not be empty")]
    Empty,

    /// Symbol contained characters other than ASCII letters and digits.
    #[error("invalid symbol: {0:?}")]
    Invalid(String),

    /// Partial depth level count not supported by the exchange.
    #[error("invalid depth limit: {0} (expected one of 5, 10, 20)")]
    InvalidDepthLimit(u32),
}

/// Validate a symbol (or listen key) and return it trimmed.
///
/// # Errors
///
/// Returns [`SymbolError::Empty`] for empty or whitespace input and
/// [`SymbolError::Invalid`] for anything that is not ASCII alphanumeric.
pub fn validate_symbol(symbol: &str) -> Result<&str, SymbolError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(SymbolError::Empty);
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SymbolError::Invalid(symbol.to_string()));
    }
    Ok(trimmed)
}

// =============================================================================
// Stream Key
// =============================================================================

/// Normalised key of a subscription: one key, one physical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    symbol: String,
    kind: StreamKind,
}

impl StreamKey {
    /// Validate and normalise a subscription tuple.
    ///
    /// Market symbols are lowercased for stream naming; listen keys are
    /// case-sensitive and kept as given.
    ///
    /// # Errors
    ///
    /// Returns a [`SymbolError`] if the symbol fails validation.
    pub fn new(symbol: &str, kind: StreamKind) -> Result<Self, SymbolError> {
        let symbol = validate_symbol(symbol)?;
        let symbol = match kind {
            StreamKind::UserData => symbol.to_string(),
            _ => symbol.to_ascii_lowercase(),
        };
        Ok(Self { symbol, kind })
    }

    /// Normalised symbol (or listen key).
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Stream kind.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Physical stream name used on the wire.
    #[must_use]
    pub fn stream_name(&self) -> String {
        match self.kind.suffix() {
            Some(suffix) => format!("{}@{suffix}", self.symbol),
            None => self.symbol.clone(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stream_name())
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

struct Entry<E> {
    key: StreamKey,
    callbacks: Vec<Callback<E>>,
}

/// Thread-safe callback registry for one stream client.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use binance_stream::domain::subscription::{
///     Callback, StreamKey, StreamKind, SubscriptionRegistry,
/// };
///
/// let registry = SubscriptionRegistry::<u64>::new();
/// let key = StreamKey::new("BTCUSDT", StreamKind::Trade).unwrap();
/// let callback: Callback<u64> = Arc::new(|_: &u64| {});
///
/// assert!(registry.add(key.clone(), Arc::clone(&callback)));
/// // Same callback again is a no-op
/// assert!(!registry.add(key.clone(), Arc::clone(&callback)));
/// assert_eq!(registry.observed_streams(), vec!["btcusdt@trade".to_string()]);
///
/// assert!(registry.remove(&key, &callback));
/// assert!(registry.observed_streams().is_empty());
/// ```
pub struct SubscriptionRegistry<E> {
    entries: RwLock<BTreeMap<String, Entry<E>>>,
}

impl<E> Default for SubscriptionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SubscriptionRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("streams", &self.observed_streams())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl<E> SubscriptionRegistry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attach a callback to a key.
    ///
    /// Returns `false` if this exact callback was already attached.
    pub fn add(&self, key: StreamKey, callback: Callback<E>) -> bool {
        let mut entries = self.entries.write();
        let entry = entries.entry(key.stream_name()).or_insert_with(|| Entry {
            key,
            callbacks: Vec::new(),
        });

        if entry.callbacks.iter().any(|c| same_callback(c, &callback)) {
            return false;
        }
        entry.callbacks.push(callback);
        true
    }

    /// Detach a callback from a key.
    ///
    /// Returns `false` if the callback was not attached. The key is dropped
    /// once its last callback is gone.
    pub fn remove(&self, key: &StreamKey, callback: &Callback<E>) -> bool {
        let stream = key.stream_name();
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&stream) else {
            return false;
        };

        let before = entry.callbacks.len();
        entry.callbacks.retain(|c| !same_callback(c, callback));
        let removed = entry.callbacks.len() != before;

        if entry.callbacks.is_empty() {
            entries.remove(&stream);
        }
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Physical stream names currently observed, sorted.
    #[must_use]
    pub fn observed_streams(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Keys currently observed, in stream-name order.
    #[must_use]
    pub fn keys(&self) -> Vec<StreamKey> {
        self.entries.read().values().map(|e| e.key.clone()).collect()
    }

    /// Callbacks attached to a physical stream, cloned out of the lock.
    #[must_use]
    pub fn callbacks_for(&self, stream: &str) -> Vec<Callback<E>> {
        self.entries
            .read()
            .get(stream)
            .map(|e| e.callbacks.clone())
            .unwrap_or_default()
    }

    /// Whether a physical stream is observed.
    #[must_use]
    pub fn contains(&self, stream: &str) -> bool {
        self.entries.read().contains_key(stream)
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Total number of attached callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.entries.read().values().map(|e| e.callbacks.len()).sum()
    }
}

fn same_callback<E>(a: &Callback<E>, b: &Callback<E>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// =============================================================================
// Tests
// =============================================================================
