//! Prometheus Metrics Module
//!
//! Counters and gauges for the streaming core, recorded through the
//! `metrics` facade. Without an installed recorder every call is a no-op.
//!
//! # Metrics Categories
//!
//! - **Messages**: frames received and frames that failed to decode
//! - **Connections**: connections opened and currently open per client
//! - **Retries**: retry pauses taken by task controllers
//! - **Caches**: resynchronisations and discarded events per cache
//!
//! # Integration
//!
//! [`init_metrics`] serves `/metrics` on the configured port.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again is a no-op.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    let _ = INSTALLED.set(addr);
    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "binance_stream_messages_received_total",
        "Total frames received from stream connections"
    );
    describe_counter!(
        "binance_stream_decode_errors_total",
        "Total frames that could not be decoded"
    );

    describe_counter!(
        "binance_stream_connections_opened_total",
        "Total stream connections opened"
    );
    describe_gauge!(
        "binance_stream_connections_open",
        "Stream connections currently open"
    );

    describe_counter!(
        "binance_stream_retry_pauses_total",
        "Total retry pauses taken after a failed or ended stream loop"
    );

    describe_counter!(
        "binance_stream_cache_resyncs_total",
        "Total cache resynchronisations from a REST snapshot"
    );
    describe_counter!(
        "binance_stream_cache_events_discarded_total",
        "Total stale or duplicate events discarded by caches"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame received by a stream client.
pub fn record_message_received(client: &'static str) {
    counter!("binance_stream_messages_received_total", "client" => client).increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(client: &'static str) {
    counter!("binance_stream_decode_errors_total", "client" => client).increment(1);
}

/// Record a connection being opened.
pub fn record_connection_opened(client: &'static str) {
    counter!("binance_stream_connections_opened_total", "client" => client).increment(1);
    gauge!("binance_stream_connections_open", "client" => client).increment(1.0);
}

/// Record a connection being closed.
pub fn record_connection_closed(client: &'static str) {
    gauge!("binance_stream_connections_open", "client" => client).decrement(1.0);
}

/// Record a retry pause.
pub fn record_retry_pause(task: &str) {
    counter!("binance_stream_retry_pauses_total", "task" => task.to_string()).increment(1);
}

/// Record a cache resynchronisation.
pub fn record_cache_resync(cache: &'static str) {
    counter!("binance_stream_cache_resyncs_total", "cache" => cache).increment(1);
}

/// Record events discarded by a cache.
pub fn record_events_discarded(cache: &'static str, count: u64) {
    counter!("binance_stream_cache_events_discarded_total", "cache" => cache).increment(count);
}

// =============================================================================
// Tests
// =============================================================================
