//! Candlestick window view.
//!
//! Kline events carry no sequence number, so the view resyncs on every new
//! connection. Ordering key is the open time: an event older than the
//! earliest retained candle is discarded, an equal open time replaces the
//! candle, a newer one is appended and the window trimmed to the limit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::{Apply, CacheView};
use crate::application::ports::{SnapshotError, SnapshotProvider};
use crate::domain::streaming::{Candlestick, CandlestickEvent, CandlestickInterval};

/// Latest `limit` candlesticks, oldest first.
#[derive(Debug, Clone)]
pub struct CandlestickView {
    limit: usize,
    candles: VecDeque<Candlestick>,
}

impl CacheView for CandlestickView {
    type Event = CandlestickEvent;
    type Parameter = CandlestickInterval;
    type Snapshot = Vec<Candlestick>;
    type Output = Vec<Candlestick>;
    type Key = DateTime<Utc>;

    const NAME: &'static str = "candlesticks";
    const RESYNC_ON_RECONNECT: bool = true;

    fn fetch<'a>(
        provider: &'a dyn SnapshotProvider,
        symbol: &'a str,
        parameter: &'a Self::Parameter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Self::Snapshot, SnapshotError>> {
        provider.candlesticks(symbol, *parameter, limit)
    }

    fn from_snapshot(_parameter: &Self::Parameter, limit: usize, snapshot: Self::Snapshot) -> Self {
        let skip = snapshot.len().saturating_sub(limit);
        Self {
            limit,
            candles: snapshot.into_iter().skip(skip).collect(),
        }
    }

    fn ordering_key(event: &Self::Event) -> Self::Key {
        event.candlestick.open_time
    }

    fn apply(&mut self, event: &Self::Event) -> Apply {
        let candle = &event.candlestick;

        if let Some(first) = self.candles.front()
            && candle.open_time < first.open_time
        {
            return Apply::Discarded;
        }

        match self
            .candles
            .binary_search_by_key(&candle.open_time, |c| c.open_time)
        {
            Ok(index) if self.candles[index] == *candle => Apply::Discarded,
            Ok(index) => {
                self.candles[index] = candle.clone();
                Apply::Applied
            }
            Err(index) => {
                self.candles.insert(index, candle.clone());
                while self.candles.len() > self.limit {
                    self.candles.pop_front();
                }
                Apply::Applied
            }
        }
    }

    fn output(&self) -> Self::Output {
        self.candles.iter().cloned().collect()
    }
}
