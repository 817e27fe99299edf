//! Stream Configuration Settings
//!
//! Configuration types for the stream clients and the price chart, loaded
//! from environment variables. Numeric values that fail to parse fall back
//! to their defaults; a bad chart symbol or interval is an error.

use std::time::Duration;

use crate::domain::streaming::CandlestickInterval;
use crate::domain::subscription::{SymbolError, validate_symbol};
use crate::infrastructure::binance::{DEFAULT_REST_URL, DEFAULT_STREAM_URL};

/// Largest candlestick window Binance serves in one request.
pub const MAX_CHART_LIMIT: usize = 1000;

/// Binance endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Combined stream base URL.
    pub stream_url: String,
    /// REST API base URL.
    pub rest_url: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
        }
    }
}

/// Streaming behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingSettings {
    /// Fixed delay between connection attempts.
    pub retry_delay: Duration,
    /// Leave streams stopped after subscription changes.
    pub auto_streaming_disabled: bool,
    /// Longest silence tolerated on an open connection.
    pub idle_timeout: Duration,
    /// REST request timeout.
    pub request_timeout: Duration,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(5000),
            auto_streaming_disabled: false,
            idle_timeout: Duration::from_secs(180),
            request_timeout: Duration::from_secs(10),
            metrics_port: 0,
        }
    }
}

/// Price chart parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSettings {
    /// Symbol to chart (uppercase).
    pub symbol: String,
    /// Number of candlesticks kept.
    pub limit: usize,
    /// Candlestick interval.
    pub interval: CandlestickInterval,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            limit: 25,
            interval: CandlestickInterval::Minute,
        }
    }
}

/// Complete stream configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Endpoints.
    pub endpoints: EndpointSettings,
    /// Streaming behaviour.
    pub streaming: StreamingSettings,
    /// Price chart parameters.
    pub chart: ChartSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_CHART_SYMBOL` or `PRICE_CHART_INTERVAL` is
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Env(&lookup);

        let endpoints = EndpointSettings {
            stream_url: env
                .non_empty("BINANCE_STREAM_URL")
                .unwrap_or(defaults.endpoints.stream_url),
            rest_url: env
                .non_empty("BINANCE_API_URL")
                .unwrap_or(defaults.endpoints.rest_url),
        };

        let streaming = StreamingSettings {
            retry_delay: env.duration_millis(
                "STREAM_RETRY_DELAY_MS",
                defaults.streaming.retry_delay,
            ),
            auto_streaming_disabled: env.bool(
                "STREAM_AUTO_STREAMING_DISABLED",
                defaults.streaming.auto_streaming_disabled,
            ),
            idle_timeout: env.duration_secs(
                "STREAM_IDLE_TIMEOUT_SECS",
                defaults.streaming.idle_timeout,
            ),
            request_timeout: env.duration_secs(
                "STREAM_REQUEST_TIMEOUT_SECS",
                defaults.streaming.request_timeout,
            ),
            metrics_port: env.parse("STREAM_METRICS_PORT", defaults.streaming.metrics_port),
        };

        let symbol = match env.non_empty("PRICE_CHART_SYMBOL") {
            Some(symbol) => validate_symbol(&symbol)
                .map_err(|error| ConfigError::InvalidSymbol {
                    key: "PRICE_CHART_SYMBOL",
                    source: error,
                })?
                .to_ascii_uppercase(),
            None => defaults.chart.symbol,
        };

        let interval = match env.non_empty("PRICE_CHART_INTERVAL") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidInterval {
                    key: "PRICE_CHART_INTERVAL",
                    value,
                })?,
            None => defaults.chart.interval,
        };

        let limit = env.parse("PRICE_CHART_LIMIT", defaults.chart.limit);
        let limit = if (1..=MAX_CHART_LIMIT).contains(&limit) {
            limit
        } else {
            defaults.chart.limit
        };

        Ok(Self {
            endpoints,
            streaming,
            chart: ChartSettings {
                symbol,
                limit,
                interval,
            },
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Symbol variable is empty or malformed.
    #[error("{key}: {source}")]
    InvalidSymbol {
        /// Variable name.
        key: &'static str,
        /// Validation failure.
        source: SymbolError,
    },
    /// Interval variable is not a Binance interval name.
    #[error("{key}: unknown candlestick interval {value:?}")]
    InvalidInterval {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        (self.0)(key).map_or(default, |v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
