//! Shared test fixtures: an in-memory transport whose connections are
//! driven by the test, a mocked snapshot source, and frame builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use mockall::mock;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use binance_stream::{
    AggregateTrade, Candlestick, CandlestickInterval, MessageStream, OrderBook, SnapshotError,
    SnapshotProvider, StreamTransport, SymbolStatistics, TransportError,
};

mock! {
    pub Snapshots {}

    #[async_trait]
    impl SnapshotProvider for Snapshots {
        async fn candlesticks(
            &self,
            symbol: &str,
            interval: CandlestickInterval,
            limit: usize,
        ) -> Result<Vec<Candlestick>, SnapshotError>;

        async fn order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, SnapshotError>;

        async fn aggregate_trades(
            &self,
            symbol: &str,
            limit: usize,
        ) -> Result<Vec<AggregateTrade>, SnapshotError>;

        async fn statistics(&self, symbol: &str) -> Result<SymbolStatistics, SnapshotError>;
    }
}

type Frames = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Transport that records every open and lets the test feed or end the
/// current connection.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    opens: Mutex<Vec<Vec<String>>>,
    current: Mutex<Option<Frames>>,
    failures: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    /// Streams requested by each successful open.
    pub fn opens(&self) -> Vec<Vec<String>> {
        self.opens.lock().clone()
    }

    /// Streams requested by the most recent open.
    pub fn last_streams(&self) -> Option<Vec<String>> {
        self.opens.lock().last().cloned()
    }

    /// Deliver a raw frame on the current connection.
    pub fn push(&self, raw: impl Into<String>) {
        if let Some(frames) = self.current.lock().as_ref() {
            let _ = frames.unbounded_send(Ok(raw.into()));
        }
    }

    /// Fault the current connection.
    pub fn fault(&self, message: &str) {
        if let Some(frames) = self.current.lock().take() {
            let _ = frames.unbounded_send(Err(TransportError::Protocol {
                message: message.to_string(),
            }));
        }
    }

    /// End the current connection cleanly.
    pub fn close(&self) {
        self.current.lock().take();
    }

    /// Poll until at least `count` opens have happened.
    pub async fn wait_for_opens(&self, count: usize) {
        wait_until(|| self.open_count() >= count).await;
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(
        &self,
        streams: &[String],
        _cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError> {
        if streams.is_empty() {
            return Err(TransportError::NoStreams);
        }

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect {
                message: "scripted failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        *self.current.lock() = Some(tx);
        self.opens.lock().push(streams.to_vec());
        Ok(rx.boxed())
    }
}

/// Poll `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

/// Combined-stream `kline` frame for a one-minute candle.
pub fn kline_frame(symbol: &str, open_time_ms: i64, close: &str) -> String {
    format!(
        r#"{{"stream":"{stream}@kline_1m","data":{{"e":"kline","E":{event},"s":"{symbol}",
        "k":{{"t":{open_time_ms},"T":{close_time},"s":"{symbol}","i":"1m","f":1,"L":2,
        "o":"100","c":"{close}","h":"110","l":"90","v":"1","n":2,"x":false,
        "q":"100","V":"0.5","Q":"50","B":"0"}}}}}}"#,
        stream = symbol.to_ascii_lowercase(),
        event = open_time_ms + 1,
        close_time = open_time_ms + 59_999,
    )
}

/// Combined-stream `aggTrade` frame.
pub fn agg_trade_frame(symbol: &str, id: u64, price: &str) -> String {
    format!(
        r#"{{"stream":"{stream}@aggTrade","data":{{"e":"aggTrade","E":1672515782136,
        "s":"{symbol}","a":{id},"p":"{price}","q":"1","f":{id},"l":{id},"T":1672515782136,
        "m":false,"M":true}}}}"#,
        stream = symbol.to_ascii_lowercase(),
    )
}

/// Combined-stream diff `depthUpdate` frame changing one bid level.
pub fn depth_frame(symbol: &str, first_id: u64, final_id: u64, bid: (&str, &str)) -> String {
    format!(
        r#"{{"stream":"{stream}@depth","data":{{"e":"depthUpdate","E":1672515782136,
        "s":"{symbol}","U":{first_id},"u":{final_id},"b":[["{price}","{quantity}"]],"a":[]}}}}"#,
        stream = symbol.to_ascii_lowercase(),
        price = bid.0,
        quantity = bid.1,
    )
}
