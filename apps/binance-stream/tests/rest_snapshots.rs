//! REST Snapshot Client Integration Tests
//!
//! Runs the REST client against a local `wiremock` server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use binance_stream::infrastructure::binance::RestConfig;
use binance_stream::{BinanceRestClient, CandlestickInterval, SnapshotError, SnapshotProvider};

fn client(server: &MockServer) -> BinanceRestClient {
    BinanceRestClient::new(&RestConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn json(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/json")
}

#[tokio::test]
async fn fetches_candlesticks_with_uppercased_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "2"))
        .respond_with(json(
            r#"[[1499040000000,"0.0163","0.8000","0.0157","0.0157","148976.11",1499040059999,
                "2434.19",308,"1756.87","28.46","0"],
               [1499040060000,"0.0157","0.0160","0.0150","0.0159","100.00",1499040119999,
                "1.59",12,"50.00","0.79","0"]]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let candles = client(&server)
        .candlesticks("btcusdt", CandlestickInterval::Minute, 2)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].symbol, "BTCUSDT");
    assert_eq!(candles[0].interval, CandlestickInterval::Minute);
    assert_eq!(candles[1].close, Decimal::from_str("0.0159").unwrap());
    assert!(candles[0].open_time < candles[1].open_time);
}

#[tokio::test]
async fn fetches_order_book() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .and(query_param("symbol", "BNBBTC"))
        .and(query_param("limit", "5"))
        .respond_with(json(
            r#"{"lastUpdateId":1027024,"bids":[["4.00000000","431.00000000"]],
                "asks":[["4.00000200","12.00000000"]]}"#,
        ))
        .mount(&server)
        .await;

    let book = client(&server).order_book("BNBBTC", 5).await.unwrap();

    assert_eq!(book.symbol, "BNBBTC");
    assert_eq!(book.last_update_id, 1_027_024);
    assert_eq!(book.bids[0].price, Decimal::from_str("4.00000000").unwrap());
    assert_eq!(book.asks[0].quantity, Decimal::from(12));
}

#[tokio::test]
async fn fetches_aggregate_trades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/aggTrades"))
        .and(query_param("symbol", "BNBBTC"))
        .respond_with(json(
            r#"[{"a":26129,"p":"0.01633102","q":"4.70443515","f":27781,"l":27781,
                "T":1498793709153,"m":true,"M":true}]"#,
        ))
        .mount(&server)
        .await;

    let trades = client(&server).aggregate_trades("bnbbtc", 1).await.unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].symbol, "BNBBTC");
    assert_eq!(trades[0].id, 26_129);
}

#[tokio::test]
async fn fetches_statistics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .and(query_param("symbol", "BNBBTC"))
        .respond_with(json(
            r#"{"symbol":"BNBBTC","priceChange":"-94.99999800","priceChangePercent":"-95.960",
                "weightedAvgPrice":"0.29628482","prevClosePrice":"0.10002000",
                "lastPrice":"4.00000200","lastQty":"200.00000000","bidPrice":"4.00000000",
                "bidQty":"100.00000000","askPrice":"4.00000200","askQty":"100.00000000",
                "openPrice":"99.00000000","highPrice":"100.00000000","lowPrice":"0.10000000",
                "volume":"8913.30000000","quoteVolume":"15.30000000","openTime":1499783499040,
                "closeTime":1499869899040,"firstId":28385,"lastId":28460,"count":76}"#,
        ))
        .mount(&server)
        .await;

    let stats = client(&server).statistics("BNBBTC").await.unwrap();

    assert_eq!(stats.symbol, "BNBBTC");
    assert_eq!(stats.trade_count, 76);
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let error = client(&server).order_book("BTCUSDT", 100).await.unwrap_err();

    assert_eq!(
        error,
        SnapshotError::RateLimited {
            status: 429,
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn ip_ban_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&server)
        .await;

    let error = client(&server)
        .candlesticks("BTCUSDT", CandlestickInterval::Hour, 10)
        .await
        .unwrap_err();

    assert_eq!(
        error,
        SnapshotError::RateLimited {
            status: 418,
            retry_after_secs: None
        }
    );
}

#[tokio::test]
async fn error_status_keeps_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
        )
        .mount(&server)
        .await;

    let error = client(&server).statistics("NOPE").await.unwrap_err();

    match error {
        SnapshotError::Status { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Invalid symbol."));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/aggTrades"))
        .respond_with(json(r#"{"unexpected":true}"#))
        .mount(&server)
        .await;

    let error = client(&server)
        .aggregate_trades("BTCUSDT", 10)
        .await
        .unwrap_err();

    assert!(matches!(error, SnapshotError::Decode { .. }));
}

#[tokio::test]
async fn unreachable_server_is_a_request_error() {
    let client = BinanceRestClient::new(&RestConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_secs(2),
    })
    .unwrap();

    let error = client.statistics("BTCUSDT").await.unwrap_err();

    assert!(matches!(error, SnapshotError::Request { .. }));
}
