//! Order book view.
//!
//! Diff-depth events carry an update ID range. After a snapshot with
//! `last_update_id = L`, the first applied event must bracket `L + 1`; from
//! then on each event must start exactly one past the previous one. Events
//! ending at or before `L` are discarded, anything else is a gap.
//!
//! Partial depth events replace the whole book.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use rust_decimal::Decimal;

use super::{Apply, CacheView};
use crate::application::ports::{SnapshotError, SnapshotProvider};
use crate::domain::streaming::{DepthEvent, DepthUpdate, OrderBook, OrderBookLevel};

/// Price-keyed order book, projected to the top `limit` levels per side.
#[derive(Debug, Clone)]
pub struct OrderBookView {
    symbol: String,
    limit: usize,
    last_update_id: u64,
    synced: bool,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBookView {
    fn replace(&mut self, book: &OrderBook) {
        self.last_update_id = book.last_update_id;
        self.bids = levels(&book.bids);
        self.asks = levels(&book.asks);
    }

    fn apply_diff(&mut self, update: &DepthUpdate) -> Apply {
        if update.final_update_id <= self.last_update_id {
            return Apply::Discarded;
        }

        let expected = self.last_update_id + 1;
        let continuous = if self.synced {
            update.first_update_id == expected
        } else {
            update.first_update_id <= expected
        };
        if !continuous {
            return Apply::Gap;
        }

        merge(&mut self.bids, &update.bids);
        merge(&mut self.asks, &update.asks);
        self.last_update_id = update.final_update_id;
        self.synced = true;
        Apply::Applied
    }
}

fn levels(levels: &[OrderBookLevel]) -> BTreeMap<Decimal, Decimal> {
    levels
        .iter()
        .filter(|level| !level.quantity.is_zero())
        .map(|level| (level.price, level.quantity))
        .collect()
}

fn merge(side: &mut BTreeMap<Decimal, Decimal>, changes: &[OrderBookLevel]) {
    for level in changes {
        if level.quantity.is_zero() {
            side.remove(&level.price);
        } else {
            side.insert(level.price, level.quantity);
        }
    }
}

impl CacheView for OrderBookView {
    type Event = DepthEvent;
    type Parameter = Option<u32>;
    type Snapshot = OrderBook;
    type Output = OrderBook;
    type Key = u64;

    const NAME: &'static str = "order_book";
    const RESYNC_ON_RECONNECT: bool = false;

    fn fetch<'a>(
        provider: &'a dyn SnapshotProvider,
        symbol: &'a str,
        _parameter: &'a Self::Parameter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Self::Snapshot, SnapshotError>> {
        provider.order_book(symbol, limit)
    }

    fn from_snapshot(_parameter: &Self::Parameter, limit: usize, snapshot: Self::Snapshot) -> Self {
        let mut view = Self {
            symbol: snapshot.symbol.clone(),
            limit,
            last_update_id: 0,
            synced: false,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        };
        view.replace(&snapshot);
        view
    }

    fn ordering_key(event: &Self::Event) -> Self::Key {
        match event {
            DepthEvent::Partial(book) => book.last_update_id,
            DepthEvent::Diff(update) => update.first_update_id,
        }
    }

    fn apply(&mut self, event: &Self::Event) -> Apply {
        match event {
            DepthEvent::Diff(update) => self.apply_diff(update),
            DepthEvent::Partial(book) if book.last_update_id < self.last_update_id => {
                Apply::Discarded
            }
            DepthEvent::Partial(book) => {
                self.replace(book);
                self.synced = true;
                Apply::Applied
            }
        }
    }

    fn output(&self) -> Self::Output {
        OrderBook {
            symbol: self.symbol.clone(),
            last_update_id: self.last_update_id,
            bids: self
                .bids
                .iter()
                .rev()
                .take(self.limit)
                .map(|(price, quantity)| OrderBookLevel::new(*price, *quantity))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(self.limit)
                .map(|(price, quantity)| OrderBookLevel::new(*price, *quantity))
                .collect(),
        }
    }
}
