//! Aggregate trade window view.
//!
//! Aggregate IDs are sequential per symbol: IDs at or below the last applied
//! one are discarded, and a skipped ID is a gap.

use std::collections::VecDeque;

use futures::future::BoxFuture;

use super::{Apply, CacheView};
use crate::application::ports::{SnapshotError, SnapshotProvider};
use crate::domain::streaming::AggregateTrade;

/// Latest `limit` aggregate trades, oldest first.
#[derive(Debug, Clone)]
pub struct AggregateTradeView {
    limit: usize,
    trades: VecDeque<AggregateTrade>,
}

impl AggregateTradeView {
    fn last_id(&self) -> Option<u64> {
        self.trades.back().map(|t| t.id)
    }
}

impl CacheView for AggregateTradeView {
    type Event = AggregateTrade;
    type Parameter = ();
    type Snapshot = Vec<AggregateTrade>;
    type Output = Vec<AggregateTrade>;
    type Key = u64;

    const NAME: &'static str = "aggregate_trades";
    const RESYNC_ON_RECONNECT: bool = false;

    fn fetch<'a>(
        provider: &'a dyn SnapshotProvider,
        symbol: &'a str,
        _parameter: &'a Self::Parameter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Self::Snapshot, SnapshotError>> {
        provider.aggregate_trades(symbol, limit)
    }

    fn from_snapshot(_parameter: &Self::Parameter, limit: usize, mut snapshot: Self::Snapshot) -> Self {
        snapshot.sort_by_key(|t| t.id);
        let skip = snapshot.len().saturating_sub(limit);
        Self {
            limit,
            trades: snapshot.into_iter().skip(skip).collect(),
        }
    }

    fn ordering_key(event: &Self::Event) -> Self::Key {
        event.id
    }

    fn apply(&mut self, event: &Self::Event) -> Apply {
        if let Some(last) = self.last_id() {
            if event.id <= last {
                return Apply::Discarded;
            }
            if event.id != last + 1 {
                return Apply::Gap;
            }
        }

        self.trades.push_back(event.clone());
        while self.trades.len() > self.limit {
            self.trades.pop_front();
        }
        Apply::Applied
    }

    fn output(&self) -> Self::Output {
        self.trades.iter().cloned().collect()
    }
}
