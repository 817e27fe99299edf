//! Cache Synchronization Integration Tests
//!
//! Drives a candlestick cache with a mocked snapshot source and a scripted
//! transport: snapshot order, live updates, stale events, resync on
//! reconnect, snapshot failure handling, and a transport that stays down.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::DateTime;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use binance_stream::application::services::SharedSettings;
use binance_stream::infrastructure::binance::{CandlestickCache, CandlestickClient};
use binance_stream::{
    CacheError, Candlestick, CandlestickInterval, SnapshotError, StreamClientAdapter,
    StreamTransport,
};
use common::{MockSnapshots, ScriptedTransport, kline_frame};

const BASE_MS: i64 = 1_700_000_040_000;
const MINUTE_MS: i64 = 60_000;
const LIMIT: usize = 25;
const RETRY_DELAY: Duration = Duration::from_millis(200);

fn d(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn candle(index: i64, close: &str) -> Candlestick {
    let open_ms = BASE_MS + index * MINUTE_MS;
    Candlestick {
        symbol: "BTCUSDT".to_string(),
        interval: CandlestickInterval::Minute,
        open_time: DateTime::from_timestamp_millis(open_ms).unwrap(),
        open: d("100"),
        high: d("110"),
        low: d("90"),
        close: d(close),
        volume: d("1"),
        close_time: DateTime::from_timestamp_millis(open_ms + MINUTE_MS - 1).unwrap(),
        quote_volume: d("100"),
        trade_count: 2,
        taker_buy_base_volume: d("0.5"),
        taker_buy_quote_volume: d("50"),
    }
}

fn snapshot() -> Vec<Candlestick> {
    (0..25).map(|i| candle(i, &format!("{}", 100 + i))).collect()
}

fn open_ms(index: i64) -> i64 {
    BASE_MS + index * MINUTE_MS
}

struct Harness {
    cache: Arc<CandlestickCache>,
    adapter: Arc<StreamClientAdapter<CandlestickClient>>,
    transport: Arc<ScriptedTransport>,
}

fn harness(snapshots: MockSnapshots) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let shared: Arc<dyn StreamTransport> = Arc::clone(&transport) as Arc<dyn StreamTransport>;
    let adapter = Arc::new(StreamClientAdapter::with_settings(
        CandlestickClient::new(),
        shared,
        Arc::new(SharedSettings::default()),
    ));
    adapter.set_retry_delay(RETRY_DELAY);
    let cache = Arc::new(CandlestickCache::new(
        Arc::clone(&adapter),
        Arc::new(snapshots),
    ));
    Harness {
        cache,
        adapter,
        transport,
    }
}

/// Run `subscribe` in the background, forwarding every published view.
fn spawn_subscription(
    harness: &Harness,
    cancel: CancellationToken,
) -> (
    mpsc::UnboundedReceiver<Arc<Vec<Candlestick>>>,
    tokio::task::JoinHandle<Result<(), CacheError>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cache = Arc::clone(&harness.cache);
    let handle = tokio::spawn(async move {
        cache
            .subscribe(
                "BTCUSDT",
                CandlestickInterval::Minute,
                LIMIT,
                Arc::new(move |view: Arc<Vec<Candlestick>>| {
                    let _ = tx.send(view);
                }),
                cancel,
            )
            .await
    });
    (rx, handle)
}

async fn next_view(
    views: &mut mpsc::UnboundedReceiver<Arc<Vec<Candlestick>>>,
) -> Arc<Vec<Candlestick>> {
    tokio::time::timeout(Duration::from_secs(2), views.recv())
        .await
        .expect("no view within 2s")
        .expect("view channel closed")
}

#[tokio::test]
async fn get_returns_snapshot_in_rest_order() {
    let mut snapshots = MockSnapshots::new();
    snapshots
        .expect_candlesticks()
        .times(1)
        .returning(|symbol, interval, limit| {
            assert_eq!(symbol, "BTCUSDT");
            assert_eq!(interval, CandlestickInterval::Minute);
            assert_eq!(limit, LIMIT);
            Ok(snapshot())
        });
    let harness = harness(snapshots);

    let view = harness
        .cache
        .get("BTCUSDT", CandlestickInterval::Minute, LIMIT)
        .await
        .unwrap();

    assert_eq!(view.len(), 25);
    assert_eq!(*view, snapshot());
    assert!(harness.adapter.observed_streams().is_empty());
    assert_eq!(harness.transport.open_count(), 0);
}

#[tokio::test]
async fn get_surfaces_snapshot_errors_verbatim() {
    let mut snapshots = MockSnapshots::new();
    snapshots.expect_candlesticks().times(1).returning(|_, _, _| {
        Err(SnapshotError::RateLimited {
            status: 429,
            retry_after_secs: Some(3),
        })
    });
    let harness = harness(snapshots);

    let error = harness
        .cache
        .get("BTCUSDT", CandlestickInterval::Minute, LIMIT)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CacheError::Snapshot(SnapshotError::RateLimited {
            status: 429,
            retry_after_secs: Some(3)
        })
    ));
}

#[tokio::test]
async fn live_events_update_append_and_discard() {
    let mut snapshots = MockSnapshots::new();
    snapshots
        .expect_candlesticks()
        .times(1)
        .returning(|_, _, _| Ok(snapshot()));
    let harness = harness(snapshots);
    let cancel = CancellationToken::new();
    let (mut views, handle) = spawn_subscription(&harness, cancel.clone());

    let initial = next_view(&mut views).await;
    assert_eq!(*initial, snapshot());

    // Same open time as the newest candle: replaced in place
    harness.transport.push(kline_frame("BTCUSDT", open_ms(24), "130"));
    let updated = next_view(&mut views).await;
    assert_eq!(updated.len(), 25);
    assert_eq!(updated[24].close, d("130"));
    assert_eq!(updated[0].open_time, initial[0].open_time);

    // Newer open time: appended, oldest trimmed
    harness.transport.push(kline_frame("BTCUSDT", open_ms(25), "131"));
    let appended = next_view(&mut views).await;
    assert_eq!(appended.len(), 25);
    assert_eq!(appended[24].open_time.timestamp_millis(), open_ms(25));
    assert_eq!(appended[0].open_time.timestamp_millis(), open_ms(1));

    // Older than the earliest retained candle: discarded, nothing published
    harness.transport.push(kline_frame("BTCUSDT", open_ms(0), "1"));
    harness.transport.push(kline_frame("BTCUSDT", open_ms(25), "132"));
    let after_stale = next_view(&mut views).await;
    assert_eq!(after_stale[24].close, d("132"));
    assert_eq!(after_stale[0].open_time.timestamp_millis(), open_ms(1));
    assert!(views.try_recv().is_err());

    assert_eq!(harness.cache.latest().unwrap(), after_stale);

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(harness.adapter.observed_streams().is_empty());
}

#[tokio::test]
async fn reconnect_triggers_fresh_snapshot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut snapshots = MockSnapshots::new();
    snapshots.expect_candlesticks().returning(move |_, _, _| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        let mut candles = snapshot();
        if call > 0 {
            candles.remove(0);
            candles.push(candle(25, "200"));
        }
        Ok(candles)
    });
    let harness = harness(snapshots);
    let cancel = CancellationToken::new();
    let (mut views, handle) = spawn_subscription(&harness, cancel.clone());

    let initial = next_view(&mut views).await;
    assert_eq!(initial[24].open_time.timestamp_millis(), open_ms(24));

    harness.transport.close();

    let resynced = next_view(&mut views).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(resynced[24].close, d("200"));
    assert_eq!(harness.adapter.connection_epoch(), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn initial_snapshot_failure_is_returned() {
    let mut snapshots = MockSnapshots::new();
    snapshots.expect_candlesticks().times(1).returning(|_, _, _| {
        Err(SnapshotError::Status {
            status: 400,
            message: "Invalid symbol.".to_string(),
        })
    });
    let harness = harness(snapshots);
    let (_views, handle) = spawn_subscription(&harness, CancellationToken::new());

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        result,
        Err(CacheError::Snapshot(SnapshotError::Status { status: 400, .. }))
    ));
    assert!(harness.adapter.observed_streams().is_empty());
}

#[tokio::test]
async fn resync_failures_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut snapshots = MockSnapshots::new();
    snapshots.expect_candlesticks().returning(move |_, _, _| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            1 => Err(SnapshotError::Request {
                message: "timed out".to_string(),
            }),
            _ => Ok(snapshot()),
        }
    });
    let harness = harness(snapshots);
    let cancel = CancellationToken::new();
    let (mut views, handle) = spawn_subscription(&harness, cancel.clone());

    next_view(&mut views).await;
    harness.transport.close();

    next_view(&mut views).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn snapshot_is_published_while_transport_is_down() {
    let mut snapshots = MockSnapshots::new();
    snapshots
        .expect_candlesticks()
        .returning(|_, _, _| Ok(snapshot()));
    let harness = harness(snapshots);
    harness.transport.fail_next_opens(usize::MAX);
    let cancel = CancellationToken::new();
    let (mut views, handle) = spawn_subscription(&harness, cancel.clone());

    let view = tokio::time::timeout(Duration::from_millis(500), views.recv())
        .await
        .expect("no view while transport is down")
        .unwrap();

    assert_eq!(*view, snapshot());
    assert_eq!(harness.cache.latest().unwrap(), view);
    assert_eq!(harness.transport.open_count(), 0);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn invalid_arguments_are_rejected_up_front() {
    let harness = harness(MockSnapshots::new());

    let error = harness
        .cache
        .get("BTCUSDT", CandlestickInterval::Minute, 0)
        .await
        .unwrap_err();
    assert!(matches!(error, CacheError::InvalidLimit { limit: 0 }));

    let error = harness
        .cache
        .get(" ", CandlestickInterval::Minute, LIMIT)
        .await
        .unwrap_err();
    assert!(matches!(error, CacheError::Stream(_)));
}
