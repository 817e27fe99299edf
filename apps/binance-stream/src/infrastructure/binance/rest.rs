//! Binance REST Snapshot Client
//!
//! Implements [`SnapshotProvider`] over the public market data endpoints:
//!
//! | Snapshot          | Endpoint                                   |
//! |-------------------|--------------------------------------------|
//! | Candlesticks      | `GET /api/v3/klines?symbol&interval&limit` |
//! | Order book        | `GET /api/v3/depth?symbol&limit`           |
//! | Aggregate trades  | `GET /api/v3/aggTrades?symbol&limit`       |
//! | 24h statistics    | `GET /api/v3/ticker/24hr?symbol`           |
//!
//! No retries happen here; a failed snapshot surfaces to the cache, which
//! decides whether to retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::messages::{AggregateTradeMessage, BookDepthMessage, KlineRow, TickerResponse};
use crate::application::ports::{CodecError, SnapshotError, SnapshotProvider};
use crate::domain::streaming::{
    AggregateTrade, Candlestick, CandlestickInterval, OrderBook, SymbolStatistics,
};

/// Default REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the REST client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    /// Base URL without path.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// `reqwest` implementation of [`SnapshotProvider`].
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    client: Client,
    base_url: String,
}

impl BinanceRestClient {
    /// Create a client from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. TLS backend
    /// initialization fails).
    pub fn new(config: &RestConfig) -> Result<Self, SnapshotError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SnapshotError::Request {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SnapshotError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, ?query, "Fetching snapshot");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SnapshotError::Request {
                message: e.to_string(),
            })?;

        let response = check_status(response).await?;
        let body = response.text().await.map_err(|e| SnapshotError::Request {
            message: e.to_string(),
        })?;

        serde_json::from_str(&body).map_err(|e| SnapshotError::Decode {
            message: e.to_string(),
        })
    }
}

async fn check_status(response: Response) -> Result<Response, SnapshotError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        tracing::warn!(status = status.as_u16(), ?retry_after_secs, "Snapshot rate limited");
        return Err(SnapshotError::RateLimited {
            status: status.as_u16(),
            retry_after_secs,
        });
    }

    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
    Err(SnapshotError::Status {
        status: status.as_u16(),
        message,
    })
}

fn decode_error(error: CodecError) -> SnapshotError {
    SnapshotError::Decode {
        message: error.to_string(),
    }
}

#[async_trait]
impl SnapshotProvider for BinanceRestClient {
    async fn candlesticks(
        &self,
        symbol: &str,
        interval: CandlestickInterval,
        limit: usize,
    ) -> Result<Vec<Candlestick>, SnapshotError> {
        let symbol = symbol.to_ascii_uppercase();
        let rows: Vec<KlineRow> = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.clone()),
                    ("interval", interval.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.into_iter()
            .map(|row| row.into_domain(&symbol, interval).map_err(decode_error))
            .collect()
    }

    async fn order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, SnapshotError> {
        let symbol = symbol.to_ascii_uppercase();
        let depth: BookDepthMessage = self
            .get(
                "/api/v3/depth",
                &[("symbol", symbol.clone()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(depth.into_domain(&symbol))
    }

    async fn aggregate_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggregateTrade>, SnapshotError> {
        let symbol = symbol.to_ascii_uppercase();
        let trades: Vec<AggregateTradeMessage> = self
            .get(
                "/api/v3/aggTrades",
                &[("symbol", symbol.clone()), ("limit", limit.to_string())],
            )
            .await?;

        trades
            .into_iter()
            .map(|trade| trade.into_domain(&symbol).map_err(decode_error))
            .collect()
    }

    async fn statistics(&self, symbol: &str) -> Result<SymbolStatistics, SnapshotError> {
        let ticker: TickerResponse = self
            .get(
                "/api/v3/ticker/24hr",
                &[("symbol", symbol.to_ascii_uppercase())],
            )
            .await?;
        SymbolStatistics::try_from(ticker).map_err(decode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = BinanceRestClient::new(&RestConfig {
            base_url: "https://api.binance.us/".to_string(),
            ..RestConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "https://api.binance.us");
    }

    #[test]
    fn default_config_targets_binance() {
        let config = RestConfig::default();
        assert_eq!(config.base_url, DEFAULT_REST_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
