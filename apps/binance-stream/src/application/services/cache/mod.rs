//! Synchronized Caches
//!
//! A cache seeds a view from a REST snapshot and keeps it current from the
//! matching stream client's events.
//!
//! # Synchronization Protocol
//!
//! 1. Subscribe to the stream first; events are buffered.
//! 2. Once the connection carrying the stream is open, fetch the snapshot.
//!    The wait is capped at the retry delay, so a transport that stays down
//!    still yields a (stale) view.
//! 3. Replay buffered events sorted by their ordering key; events at or
//!    before the snapshot position are discarded by the view.
//! 4. Apply live events, publishing a fresh `Arc` view after each change.
//!
//! A view reports a [`Apply::Gap`] when it can prove an event was missed;
//! views without sequence numbers ask for a resync on every new connection
//! epoch instead. Either way the cache goes back to step 2 while events
//! keep buffering, up to [`MAX_PENDING_EVENTS`]; the oldest are dropped
//! beyond that.

mod aggregate_trade;
mod candlestick;
mod order_book;
mod statistics;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

pub use aggregate_trade::AggregateTradeView;
pub use candlestick::CandlestickView;
pub use order_book::OrderBookView;
pub use statistics::StatisticsView;

use super::client_manager::{ConnectionEvent, StreamClientAdapter, StreamError};
use crate::application::ports::{SnapshotError, SnapshotProvider, StreamClient};
use crate::domain::subscription::Callback;
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Most events kept buffered while a snapshot is outstanding.
pub const MAX_PENDING_EVENTS: usize = 10_000;

/// Callback receiving each published view.
pub type ViewCallback<T> = Arc<dyn Fn(Arc<T>) + Send + Sync>;

/// Outcome of applying one event to a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    /// The view changed.
    Applied,
    /// The event was stale or a duplicate.
    Discarded,
    /// An event was missed; the view must be rebuilt from a snapshot.
    Gap,
}

/// Cache error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Subscription failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Snapshot could not be fetched.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Limit must be at least one.
    #[error("invalid limit: {limit}")]
    InvalidLimit {
        /// Rejected limit.
        limit: usize,
    },
}

/// A point-in-time view that a [`SynchronizedCache`] keeps current.
pub trait CacheView: Sized + Send + 'static {
    /// Stream event consumed by the view.
    type Event: Clone + Send + Sync + 'static;

    /// Subscription parameter of the stream.
    type Parameter: Clone + fmt::Debug + Send + Sync + 'static;

    /// REST snapshot the view is seeded from.
    type Snapshot: Send + 'static;

    /// Immutable projection handed to callbacks.
    type Output: Send + Sync + 'static;

    /// Ordering key used to replay buffered events.
    type Key: Ord;

    /// Name used in logs and metrics labels.
    const NAME: &'static str;

    /// Whether every new connection requires a fresh snapshot.
    const RESYNC_ON_RECONNECT: bool;

    /// Fetch the snapshot for a subscription.
    fn fetch<'a>(
        provider: &'a dyn SnapshotProvider,
        symbol: &'a str,
        parameter: &'a Self::Parameter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Self::Snapshot, SnapshotError>>;

    /// Seed a view from a snapshot.
    fn from_snapshot(parameter: &Self::Parameter, limit: usize, snapshot: Self::Snapshot) -> Self;

    /// Ordering key of an event.
    fn ordering_key(event: &Self::Event) -> Self::Key;

    /// Apply one event.
    fn apply(&mut self, event: &Self::Event) -> Apply;

    /// Project the current state.
    fn output(&self) -> Self::Output;
}

enum Step<E> {
    Event(E),
    Resync,
    Lagged,
    Other,
    Stop,
}

// =============================================================================
// Synchronized Cache
// =============================================================================

/// Cache of view `V` fed by the stream client `C`.
pub struct SynchronizedCache<V, C>
where
    V: CacheView,
    C: StreamClient<Event = V::Event, Parameter = V::Parameter>,
{
    adapter: Arc<StreamClientAdapter<C>>,
    snapshots: Arc<dyn SnapshotProvider>,
    latest: Mutex<Option<Arc<V::Output>>>,
    _view: PhantomData<fn() -> V>,
}

impl<V, C> fmt::Debug for SynchronizedCache<V, C>
where
    V: CacheView,
    C: StreamClient<Event = V::Event, Parameter = V::Parameter>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedCache")
            .field("view", &V::NAME)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl<V, C> SynchronizedCache<V, C>
where
    V: CacheView,
    C: StreamClient<Event = V::Event, Parameter = V::Parameter>,
{
    /// Create a cache over a stream adapter and snapshot source.
    #[must_use]
    pub fn new(adapter: Arc<StreamClientAdapter<C>>, snapshots: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            adapter,
            snapshots,
            latest: Mutex::new(None),
            _view: PhantomData,
        }
    }

    /// Last view published by any subscription of this cache.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<V::Output>> {
        self.latest.lock().clone()
    }

    /// Fetch a snapshot and return it as a view, without streaming.
    ///
    /// # Errors
    ///
    /// Returns validation errors and snapshot errors as-is.
    pub async fn get(
        &self,
        symbol: &str,
        parameter: V::Parameter,
        limit: usize,
    ) -> Result<Arc<V::Output>, CacheError> {
        check_limit(limit)?;
        C::stream_key(symbol, &parameter).map_err(StreamError::from)?;

        let snapshot = V::fetch(self.snapshots.as_ref(), symbol, &parameter, limit).await?;
        Ok(Arc::new(V::from_snapshot(&parameter, limit, snapshot).output()))
    }

    /// Keep a view synchronized until `cancel` fires.
    ///
    /// `callback` receives the view after the initial snapshot and after
    /// every change. The stream subscription is removed on return.
    ///
    /// # Errors
    ///
    /// Returns validation and subscription errors, and the error of the
    /// initial snapshot. Later snapshot failures are retried after the
    /// adapter's retry delay.
    pub async fn subscribe(
        &self,
        symbol: &str,
        parameter: V::Parameter,
        limit: usize,
        callback: ViewCallback<V::Output>,
        cancel: CancellationToken,
    ) -> Result<(), CacheError> {
        check_limit(limit)?;
        let key = C::stream_key(symbol, &parameter).map_err(StreamError::from)?;
        let stream = key.stream_name();

        let (tx, rx) = mpsc::unbounded_channel();
        let forward: Callback<V::Event> = Arc::new(move |event: &V::Event| {
            let _ = tx.send(event.clone());
        });

        let connections = self.adapter.subscribe_connection_events();
        self.adapter
            .subscribe(symbol, &parameter, Arc::clone(&forward))
            .await?;
        tracing::debug!(cache = V::NAME, %stream, limit, "Cache subscribed");

        let session = Session {
            symbol,
            parameter: &parameter,
            limit,
            stream: &stream,
            events: rx,
            connections,
            callback,
            cancel,
        };
        let result = self.run(session).await;

        if let Err(error) = self.adapter.unsubscribe(symbol, &parameter, &forward).await {
            tracing::warn!(cache = V::NAME, %stream, error = %error, "Cache unsubscribe failed");
        }
        tracing::debug!(cache = V::NAME, %stream, "Cache unsubscribed");
        result
    }

    async fn run(&self, mut session: Session<'_, V>) -> Result<(), CacheError> {
        let mut initial = true;
        // Events survive a failed replay so the next snapshot can use them.
        let mut pending: Vec<V::Event> = Vec::new();

        'sync: loop {
            if !self.wait_for_connection(&mut session).await {
                return Ok(());
            }

            let epoch = self.adapter.connection_epoch();
            let fetched = tokio::select! {
                () = session.cancel.cancelled() => return Ok(()),
                fetched = V::fetch(self.snapshots.as_ref(), session.symbol, session.parameter, session.limit) => fetched,
            };

            buffer_pending::<V>(&mut session.events, &mut pending, MAX_PENDING_EVENTS);

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(error) if initial => return Err(error.into()),
                Err(error) => {
                    tracing::warn!(cache = V::NAME, stream = session.stream, error = %error, "Snapshot failed, retrying");
                    if !self.pause(&session.cancel).await {
                        return Ok(());
                    }
                    continue 'sync;
                }
            };
            initial = false;

            let mut view = V::from_snapshot(session.parameter, session.limit, snapshot);

            let mut discarded = 0_u64;
            for event in &pending {
                match view.apply(event) {
                    Apply::Applied => {}
                    Apply::Discarded => discarded += 1,
                    Apply::Gap => {
                        self.note_resync(session.stream, "gap during replay");
                        if !self.pause(&session.cancel).await {
                            return Ok(());
                        }
                        continue 'sync;
                    }
                }
            }
            if discarded > 0 {
                metrics::record_events_discarded(V::NAME, discarded);
            }
            tracing::debug!(
                cache = V::NAME,
                stream = session.stream,
                epoch,
                replayed = pending.len(),
                discarded,
                "Cache synchronized"
            );
            pending.clear();
            self.publish(&view, &session.callback);

            loop {
                let step = tokio::select! {
                    () = session.cancel.cancelled() => Step::Stop,
                    event = session.events.recv() => event.map_or(Step::Stop, Step::Event),
                    connection = session.connections.recv() => match connection {
                        Ok(ConnectionEvent::Opened { epoch: opened, .. })
                            if V::RESYNC_ON_RECONNECT && opened > epoch => Step::Resync,
                        Ok(_) => Step::Other,
                        Err(broadcast::error::RecvError::Lagged(_)) => Step::Lagged,
                        Err(broadcast::error::RecvError::Closed) => Step::Stop,
                    },
                };

                match step {
                    Step::Event(event) => match view.apply(&event) {
                        Apply::Applied => self.publish(&view, &session.callback),
                        Apply::Discarded => metrics::record_events_discarded(V::NAME, 1),
                        Apply::Gap => {
                            self.note_resync(session.stream, "sequence gap");
                            pending.push(event);
                            continue 'sync;
                        }
                    },
                    Step::Resync => {
                        self.note_resync(session.stream, "reconnected");
                        continue 'sync;
                    }
                    Step::Lagged if V::RESYNC_ON_RECONNECT => {
                        self.note_resync(session.stream, "connection events lagged");
                        continue 'sync;
                    }
                    Step::Lagged | Step::Other => {}
                    Step::Stop => return Ok(()),
                }
            }
        }
    }

    /// Wait until the stream's connection is open, streaming is stopped, or
    /// one retry delay has passed.
    ///
    /// Returns `false` if cancelled.
    async fn wait_for_connection(&self, session: &mut Session<'_, V>) -> bool {
        let deadline = tokio::time::sleep(self.adapter.retry_delay());
        tokio::pin!(deadline);

        loop {
            if !self.adapter.is_streaming() || self.adapter.is_stream_open(session.stream) {
                return true;
            }
            tokio::select! {
                () = session.cancel.cancelled() => return false,
                () = &mut deadline => {
                    tracing::debug!(cache = V::NAME, stream = session.stream, "Connection not open, fetching snapshot anyway");
                    return true;
                }
                event = session.connections.recv() => {
                    if matches!(event, Err(broadcast::error::RecvError::Closed)) {
                        return true;
                    }
                }
            }
        }
    }

    /// Sleep for the retry delay. Returns `false` if cancelled.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.adapter.retry_delay()) => true,
        }
    }

    fn note_resync(&self, stream: &str, reason: &'static str) {
        metrics::record_cache_resync(V::NAME);
        tracing::info!(cache = V::NAME, stream, reason, "Cache resynchronizing");
    }

    fn publish(&self, view: &V, callback: &ViewCallback<V::Output>) {
        let output = Arc::new(view.output());
        *self.latest.lock() = Some(Arc::clone(&output));
        callback(output);
    }
}

struct Session<'a, V: CacheView> {
    symbol: &'a str,
    parameter: &'a V::Parameter,
    limit: usize,
    stream: &'a str,
    events: mpsc::UnboundedReceiver<V::Event>,
    connections: broadcast::Receiver<ConnectionEvent>,
    callback: ViewCallback<V::Output>,
    cancel: CancellationToken,
}

/// Move buffered events into `pending`, ordered by key, keeping at most
/// `cap` of the newest. Returns how many were dropped.
fn buffer_pending<V: CacheView>(
    events: &mut mpsc::UnboundedReceiver<V::Event>,
    pending: &mut Vec<V::Event>,
    cap: usize,
) -> usize {
    while let Ok(event) = events.try_recv() {
        pending.push(event);
    }
    pending.sort_by_key(V::ordering_key);

    let excess = pending.len().saturating_sub(cap);
    if excess > 0 {
        pending.drain(..excess);
        metrics::record_events_discarded(V::NAME, u64::try_from(excess).unwrap_or(u64::MAX));
        tracing::warn!(cache = V::NAME, dropped = excess, "Pending event buffer full, dropped oldest");
    }
    excess
}

const fn check_limit(limit: usize) -> Result<(), CacheError> {
    if limit == 0 {
        return Err(CacheError::InvalidLimit { limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::streaming::AggregateTrade;

    fn trade(id: u64) -> AggregateTrade {
        AggregateTrade {
            symbol: "BTCUSDT".to_string(),
            id,
            price: Decimal::from(100),
            quantity: Decimal::ONE,
            first_trade_id: id,
            last_trade_id: id,
            time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            is_buyer_maker: true,
        }
    }

    #[test]
    fn buffered_events_are_sorted_and_bounded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = vec![trade(3)];
        for id in [7, 1, 5, 2, 6, 4] {
            tx.send(trade(id)).unwrap();
        }

        let dropped = buffer_pending::<AggregateTradeView>(&mut rx, &mut pending, 4);

        assert_eq!(dropped, 3);
        let ids: Vec<_> = pending.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 5, 6, 7]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn buffer_under_cap_keeps_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = Vec::new();
        tx.send(trade(2)).unwrap();
        tx.send(trade(1)).unwrap();

        let dropped = buffer_pending::<AggregateTradeView>(&mut rx, &mut pending, MAX_PENDING_EVENTS);

        assert_eq!(dropped, 0);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, 1);
    }
}
