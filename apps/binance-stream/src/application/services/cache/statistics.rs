//! Rolling 24h statistics view.
//!
//! Every event is a full replacement, so the view never needs a resync.
//! Events are ordered by window close time, the one timestamp both the REST
//! ticker and the stream carry; events closing before the current view are
//! discarded.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::{Apply, CacheView};
use crate::application::ports::{SnapshotError, SnapshotProvider};
use crate::domain::streaming::SymbolStatistics;

/// Latest statistics of one symbol.
#[derive(Debug, Clone)]
pub struct StatisticsView {
    current: SymbolStatistics,
}

impl CacheView for StatisticsView {
    type Event = SymbolStatistics;
    type Parameter = ();
    type Snapshot = SymbolStatistics;
    type Output = SymbolStatistics;
    type Key = DateTime<Utc>;

    const NAME: &'static str = "statistics";
    const RESYNC_ON_RECONNECT: bool = false;

    fn fetch<'a>(
        provider: &'a dyn SnapshotProvider,
        symbol: &'a str,
        _parameter: &'a Self::Parameter,
        _limit: usize,
    ) -> BoxFuture<'a, Result<Self::Snapshot, SnapshotError>> {
        provider.statistics(symbol)
    }

    fn from_snapshot(_parameter: &Self::Parameter, _limit: usize, snapshot: Self::Snapshot) -> Self {
        Self { current: snapshot }
    }

    fn ordering_key(event: &Self::Event) -> Self::Key {
        event.close_time
    }

    fn apply(&mut self, event: &Self::Event) -> Apply {
        if event.close_time < self.current.close_time || *event == self.current {
            return Apply::Discarded;
        }
        self.current = event.clone();
        Apply::Applied
    }

    fn output(&self) -> Self::Output {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn stats(close_secs: i64, last_price: i64) -> SymbolStatistics {
        SymbolStatistics {
            symbol: "BTCUSDT".to_string(),
            price_change: Decimal::ZERO,
            price_change_percent: Decimal::ZERO,
            weighted_average_price: Decimal::from(last_price),
            last_price: Decimal::from(last_price),
            last_quantity: Decimal::ONE,
            bid_price: Decimal::from(last_price - 1),
            bid_quantity: Decimal::ONE,
            ask_price: Decimal::from(last_price + 1),
            ask_quantity: Decimal::ONE,
            open_price: Decimal::from(last_price),
            high_price: Decimal::from(last_price),
            low_price: Decimal::from(last_price),
            volume: Decimal::TEN,
            quote_volume: Decimal::from(last_price * 10),
            open_time: DateTime::from_timestamp(close_secs - 86_400, 0).unwrap(),
            close_time: DateTime::from_timestamp(close_secs, 0).unwrap(),
            first_trade_id: 1,
            last_trade_id: 10,
            trade_count: 10,
        }
    }

    #[test]
    fn newer_event_replaces() {
        let mut view = StatisticsView::from_snapshot(&(), 1, stats(100_000, 50));
        assert_eq!(view.apply(&stats(100_001, 51)), Apply::Applied);
        assert_eq!(view.output().last_price, Decimal::from(51));
    }

    #[test]
    fn replay_orders_by_close_time() {
        let mut events = vec![stats(100_003, 53), stats(100_001, 51), stats(100_002, 52)];
        events.sort_by_key(StatisticsView::ordering_key);

        let mut view = StatisticsView::from_snapshot(&(), 1, stats(100_000, 50));
        for event in &events {
            assert_eq!(view.apply(event), Apply::Applied);
        }
        assert_eq!(view.output().last_price, Decimal::from(53));
    }

    #[test]
    fn same_window_update_replaces_but_duplicate_is_discarded() {
        let mut view = StatisticsView::from_snapshot(&(), 1, stats(100_000, 50));
        assert_eq!(view.apply(&stats(100_000, 50)), Apply::Discarded);
        assert_eq!(view.apply(&stats(100_000, 52)), Apply::Applied);
        assert_eq!(view.output().last_price, Decimal::from(52));
    }

    #[test]
    fn older_event_is_discarded() {
        let mut view = StatisticsView::from_snapshot(&(), 1, stats(100_000, 50));
        assert_eq!(view.apply(&stats(99_999, 49)), Apply::Discarded);
        assert_eq!(view.output().last_price, Decimal::from(50));
    }
}
