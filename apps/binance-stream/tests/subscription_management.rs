//! Subscription Management Integration Tests
//!
//! Tests validation, reconnect-per-change, auto-streaming control, callback
//! dispatch, and disposal through the client manager.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use binance_stream::{
    AggregateTrade, Callback, CandlestickEvent, CandlestickInterval, DepthEvent, StreamError,
    StreamTransport, Trade, WebSocketClientManager,
};
use common::{ScriptedTransport, agg_trade_frame, wait_until};

fn manager() -> (WebSocketClientManager, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new());
    let shared: Arc<dyn StreamTransport> = Arc::clone(&transport) as Arc<dyn StreamTransport>;
    let manager = WebSocketClientManager::new(shared);
    manager.set_retry_delay(Duration::from_millis(20));
    (manager, transport)
}

fn noop_trade() -> Callback<Trade> {
    Arc::new(|_: &Trade| {})
}

#[tokio::test]
async fn empty_symbol_is_rejected_without_side_effects() {
    let (manager, transport) = manager();

    for symbol in ["", "   "] {
        let result = manager.subscribe_trades(symbol, noop_trade()).await;
        assert_eq!(result, Err(StreamError::EmptySymbol));
    }

    let result = manager.subscribe_trades("BTC/USDT", noop_trade()).await;
    assert!(matches!(result, Err(StreamError::InvalidSymbol { .. })));

    let result = manager
        .subscribe_depth("BTCUSDT", Some(7), Arc::new(|_: &DepthEvent| {}))
        .await;
    assert_eq!(result, Err(StreamError::InvalidDepthLimit { limit: 7 }));

    assert!(manager.observed_streams().is_empty());
    assert!(!manager.trades().is_streaming());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 0);

    manager.dispose().await;
}

#[tokio::test]
async fn each_subscription_change_reconnects_once() {
    let (manager, transport) = manager();

    manager
        .subscribe_trades("BTCUSDT", noop_trade())
        .await
        .unwrap();
    transport.wait_for_opens(1).await;
    assert_eq!(transport.last_streams().unwrap(), vec!["btcusdt@trade"]);

    manager
        .subscribe_trades("ETHUSDT", noop_trade())
        .await
        .unwrap();
    transport.wait_for_opens(2).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(
        transport.last_streams().unwrap(),
        vec!["btcusdt@trade", "ethusdt@trade"]
    );
    assert_eq!(manager.trades().connection_epoch(), 2);

    manager.dispose().await;
}

#[tokio::test]
async fn subscribe_then_unsubscribe_restores_observed_streams() {
    let (manager, transport) = manager();
    let callback = noop_trade();

    assert!(
        manager
            .subscribe_trades("BTCUSDT", Arc::clone(&callback))
            .await
            .unwrap()
    );
    transport.wait_for_opens(1).await;

    assert!(manager.unsubscribe_trades("btcusdt", &callback).await.unwrap());
    assert!(manager.observed_streams().is_empty());
    assert!(!manager.trades().is_streaming());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 1);

    manager.dispose().await;
}

#[tokio::test]
async fn duplicate_callback_is_not_added_twice() {
    let (manager, transport) = manager();
    let callback = noop_trade();

    assert!(
        manager
            .subscribe_trades("BTCUSDT", Arc::clone(&callback))
            .await
            .unwrap()
    );
    assert!(
        !manager
            .subscribe_trades("BTCUSDT", Arc::clone(&callback))
            .await
            .unwrap()
    );
    assert_eq!(manager.observed_streams(), vec!["btcusdt@trade"]);

    transport.wait_for_opens(2).await;
    manager.dispose().await;
}

#[tokio::test]
async fn disabled_auto_streaming_defers_connection_until_started() {
    let (manager, transport) = manager();
    manager.set_auto_streaming_disabled(true);
    assert!(manager.is_auto_streaming_disabled());

    for symbol in ["BTCUSDT", "ETHUSDT", "BNBUSDT"] {
        manager
            .subscribe_aggregate_trades(symbol, Arc::new(|_: &AggregateTrade| {}))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 0);
    assert!(!manager.aggregate_trades().is_streaming());

    manager.start_streaming().await.unwrap();
    transport.wait_for_opens(1).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        transport.last_streams().unwrap(),
        vec!["bnbusdt@aggTrade", "btcusdt@aggTrade", "ethusdt@aggTrade"]
    );

    manager.stop_streaming().await;
    assert!(!manager.aggregate_trades().is_streaming());

    manager.dispose().await;
}

#[tokio::test]
async fn frames_reach_matching_callbacks() {
    let (manager, transport) = manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    manager
        .subscribe_aggregate_trades(
            "BTCUSDT",
            Arc::new(move |trade: &AggregateTrade| sink.lock().push(trade.id)),
        )
        .await
        .unwrap();
    transport.wait_for_opens(1).await;

    transport.push(agg_trade_frame("BTCUSDT", 41, "16500.10"));
    transport.push("not json");
    transport.push(r#"{"result":null,"id":1}"#);
    transport.push(agg_trade_frame("BTCUSDT", 42, "16500.20"));

    wait_until(|| seen.lock().len() == 2).await;
    assert_eq!(*seen.lock(), vec![41, 42]);

    manager.dispose().await;
}

#[tokio::test]
async fn kinds_stream_independently() {
    let (manager, transport) = manager();

    manager
        .subscribe_trades("BTCUSDT", noop_trade())
        .await
        .unwrap();
    transport.wait_for_opens(1).await;

    manager
        .subscribe_candlesticks(
            "BTCUSDT",
            CandlestickInterval::Minute,
            Arc::new(|_: &CandlestickEvent| {}),
        )
        .await
        .unwrap();
    transport.wait_for_opens(2).await;

    assert!(manager.trades().is_streaming());
    assert!(manager.candlesticks().is_streaming());
    assert_eq!(
        manager.observed_streams(),
        vec!["btcusdt@trade", "btcusdt@kline_1m"]
    );

    manager.dispose().await;
}

#[tokio::test]
async fn disposed_manager_reports_errors() {
    let (manager, _transport) = manager();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    manager.set_error_handler(Some(Arc::new(move |error: &StreamError| {
        sink.lock().push(error.clone());
    })));

    manager.dispose().await;

    let result = manager.subscribe_trades("BTCUSDT", noop_trade()).await;
    assert_eq!(result, Err(StreamError::Disposed));
    assert_eq!(*reported.lock(), vec![StreamError::Disposed]);

    // Validation failures are returned but not reported
    let result = manager.subscribe_trades("", noop_trade()).await;
    assert_eq!(result, Err(StreamError::EmptySymbol));
    assert_eq!(reported.lock().len(), 1);
}
