//! Binance Price Chart Binary
//!
//! Prints a candlestick window for one symbol, then keeps it live: every
//! kline event re-renders the chart until Ctrl-C. Connection pauses and
//! resumptions are reported as they happen.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin binance-price-chart
//! ```
//!
//! # Environment Variables
//!
//! - `PRICE_CHART_SYMBOL`: Symbol to chart (default: BTCUSDT)
//! - `PRICE_CHART_INTERVAL`: Candlestick interval (default: 1m)
//! - `PRICE_CHART_LIMIT`: Candlesticks kept (default: 25)
//! - `BINANCE_STREAM_URL`: Combined stream base URL (default: wss://stream.binance.com:9443)
//! - `BINANCE_API_URL`: REST base URL (default: https://api.binance.com)
//! - `STREAM_RETRY_DELAY_MS`: Fixed reconnect delay (default: 5000)
//! - `STREAM_IDLE_TIMEOUT_SECS`: Idle read timeout (default: 180)
//! - `STREAM_REQUEST_TIMEOUT_SECS`: REST timeout (default: 10)
//! - `STREAM_METRICS_PORT`: Prometheus listener port, 0 to disable (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter

use std::sync::Arc;

use anyhow::Context;
use binance_stream::application::services::TaskEvent;
use binance_stream::application::services::cache::ViewCallback;
use binance_stream::domain::streaming::Candlestick;
use binance_stream::infrastructure::binance::{
    BinanceRestClient, CandlestickCache, RestConfig, WebSocketClientManager, WebSocketConfig,
    WebSocketTransport,
};
use binance_stream::infrastructure::config::StreamConfig;
use binance_stream::infrastructure::{metrics, telemetry};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

const BAR_WIDTH: usize = 40;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    let config = StreamConfig::from_env()?;
    log_config(&config);

    if config.streaming.metrics_port != 0 {
        metrics::init_metrics(config.streaming.metrics_port)
            .context("failed to start Prometheus listener")?;
    }

    let transport = Arc::new(WebSocketTransport::new(WebSocketConfig {
        base_url: config.endpoints.stream_url.clone(),
        idle_timeout: config.streaming.idle_timeout,
    }));
    let rest = Arc::new(BinanceRestClient::new(&RestConfig {
        base_url: config.endpoints.rest_url.clone(),
        timeout: config.streaming.request_timeout,
    })?);

    let manager = WebSocketClientManager::new(transport);
    manager.set_retry_delay(config.streaming.retry_delay);
    manager.set_auto_streaming_disabled(config.streaming.auto_streaming_disabled);

    let cache = CandlestickCache::new(Arc::clone(manager.candlesticks()), rest);
    let chart = &config.chart;

    let initial = cache
        .get(&chart.symbol, chart.interval, chart.limit)
        .await
        .context("failed to fetch initial candlesticks")?;
    println!("{}", render(&chart.symbol, &initial));

    let shutdown = CancellationToken::new();
    let lifecycle = tokio::spawn(report_lifecycle(
        manager.candlesticks().subscribe_task_events(),
        shutdown.clone(),
    ));

    let symbol = chart.symbol.clone();
    let on_update: ViewCallback<Vec<Candlestick>> =
        Arc::new(move |candles: Arc<Vec<Candlestick>>| println!("{}", render(&symbol, &candles)));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        await_shutdown().await;
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    let result = cache
        .subscribe(
            &chart.symbol,
            chart.interval,
            chart.limit,
            on_update,
            shutdown.clone(),
        )
        .await;

    shutdown.cancel();
    manager.dispose().await;
    let _ = lifecycle.await;

    result.context("candlestick subscription failed")?;
    tracing::info!("Price chart stopped");
    Ok(())
}

/// Print pause/resume notifications until shutdown.
async fn report_lifecycle(
    mut events: tokio::sync::broadcast::Receiver<TaskEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(TaskEvent::Pausing { delay }) => {
                println!("-- connection lost, retrying in {}ms", delay.as_millis());
            }
            Ok(TaskEvent::Resuming) => println!("-- reconnecting"),
            Ok(TaskEvent::Error(error)) => tracing::debug!(error = %error, "Stream run failed"),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Lifecycle listener lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Render the window as one line per candle with a close-price bar.
fn render(symbol: &str, candles: &[Candlestick]) -> String {
    use std::fmt::Write as _;

    let low = candles.iter().map(|c| c.close).min().unwrap_or_default();
    let high = candles.iter().map(|c| c.close).max().unwrap_or_default();
    let range = high - low;

    let mut out = format!("\n{symbol} ({} candles)\n", candles.len());
    for candle in candles {
        let width = if range.is_zero() {
            BAR_WIDTH / 2
        } else {
            ((candle.close - low) / range * Decimal::from(BAR_WIDTH))
                .round()
                .to_usize()
                .unwrap_or(0)
        };
        let _ = writeln!(
            out,
            "{} {:>14} {}",
            candle.open_time.format("%H:%M:%S"),
            candle.close,
            "#".repeat(width.max(1))
        );
    }
    out
}

fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn log_config(config: &StreamConfig) {
    tracing::info!(
        symbol = %config.chart.symbol,
        interval = %config.chart.interval,
        limit = config.chart.limit,
        retry_delay_ms = u64::try_from(config.streaming.retry_delay.as_millis()).unwrap_or(u64::MAX),
        auto_streaming_disabled = config.streaming.auto_streaming_disabled,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.endpoints.stream_url,
        rest_url = %config.endpoints.rest_url,
        "Binance endpoints"
    );
}

/// Wait for SIGINT (or SIGTERM on unix).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
