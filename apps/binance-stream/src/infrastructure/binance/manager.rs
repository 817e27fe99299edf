//! WebSocket Client Manager
//!
//! Owns one [`StreamClientAdapter`] per Binance stream client, all sharing a
//! single transport and one set of [`SharedSettings`]. Subscriptions are
//! routed to the adapter for their kind; each adapter keeps its own
//! connection so churn on one kind never interrupts another.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{StreamClient, StreamTransport};
use crate::application::services::{ErrorHandler, SharedSettings, StreamClientAdapter, StreamError};
use crate::domain::streaming::{
    AggregateTrade, CandlestickEvent, CandlestickInterval, DepthEvent, SymbolStatistics, Trade,
    UserDataEvent,
};
use crate::domain::subscription::Callback;

use super::clients::{
    AggregateTradeClient, CandlestickClient, DepthClient, StatisticsClient, TradeClient,
    UserDataClient,
};

fn adapter<C: StreamClient>(
    client: C,
    transport: &Arc<dyn StreamTransport>,
    settings: &Arc<SharedSettings>,
) -> Arc<StreamClientAdapter<C>> {
    Arc::new(StreamClientAdapter::with_settings(
        client,
        Arc::clone(transport),
        Arc::clone(settings),
    ))
}

/// Subscription manager across every Binance stream kind.
#[derive(Debug)]
pub struct WebSocketClientManager {
    settings: Arc<SharedSettings>,
    trades: Arc<StreamClientAdapter<TradeClient>>,
    aggregate_trades: Arc<StreamClientAdapter<AggregateTradeClient>>,
    candlesticks: Arc<StreamClientAdapter<CandlestickClient>>,
    depth: Arc<StreamClientAdapter<DepthClient>>,
    statistics: Arc<StreamClientAdapter<StatisticsClient>>,
    user_data: Arc<StreamClientAdapter<UserDataClient>>,
}

impl WebSocketClientManager {
    /// Create a manager whose adapters all open connections through
    /// `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        let settings = Arc::new(SharedSettings::default());

        Self {
            trades: adapter(TradeClient::new(), &transport, &settings),
            aggregate_trades: adapter(AggregateTradeClient::new(), &transport, &settings),
            candlesticks: adapter(CandlestickClient::new(), &transport, &settings),
            depth: adapter(DepthClient::new(), &transport, &settings),
            statistics: adapter(StatisticsClient::new(), &transport, &settings),
            user_data: adapter(UserDataClient::new(), &transport, &settings),
            settings,
        }
    }

    // -------------------------------------------------------------------------
    // Adapters
    // -------------------------------------------------------------------------

    /// Trade stream adapter.
    #[must_use]
    pub const fn trades(&self) -> &Arc<StreamClientAdapter<TradeClient>> {
        &self.trades
    }

    /// Aggregate trade stream adapter.
    #[must_use]
    pub const fn aggregate_trades(&self) -> &Arc<StreamClientAdapter<AggregateTradeClient>> {
        &self.aggregate_trades
    }

    /// Candlestick stream adapter.
    #[must_use]
    pub const fn candlesticks(&self) -> &Arc<StreamClientAdapter<CandlestickClient>> {
        &self.candlesticks
    }

    /// Depth stream adapter.
    #[must_use]
    pub const fn depth(&self) -> &Arc<StreamClientAdapter<DepthClient>> {
        &self.depth
    }

    /// Statistics stream adapter.
    #[must_use]
    pub const fn statistics(&self) -> &Arc<StreamClientAdapter<StatisticsClient>> {
        &self.statistics
    }

    /// User-data stream adapter.
    #[must_use]
    pub const fn user_data(&self) -> &Arc<StreamClientAdapter<UserDataClient>> {
        &self.user_data
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Whether subscription changes leave streaming stopped.
    #[must_use]
    pub fn is_auto_streaming_disabled(&self) -> bool {
        self.settings.auto_streaming_disabled()
    }

    /// Enable or disable automatic streaming for every adapter.
    pub fn set_auto_streaming_disabled(&self, disabled: bool) {
        self.settings.set_auto_streaming_disabled(disabled);
    }

    /// Install (or clear) the handler for non-validation failures.
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        self.settings.set_error_handler(handler);
    }

    /// Current retry delay (shared by every adapter).
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.trades.retry_delay()
    }

    /// Change the retry delay of every adapter.
    pub fn set_retry_delay(&self, delay: Duration) {
        self.trades.set_retry_delay(delay);
        self.aggregate_trades.set_retry_delay(delay);
        self.candlesticks.set_retry_delay(delay);
        self.depth.set_retry_delay(delay);
        self.statistics.set_retry_delay(delay);
        self.user_data.set_retry_delay(delay);
    }

    /// Physical streams observed across all adapters.
    #[must_use]
    pub fn observed_streams(&self) -> Vec<String> {
        let mut streams = Vec::new();
        streams.extend(self.trades.observed_streams());
        streams.extend(self.aggregate_trades.observed_streams());
        streams.extend(self.candlesticks.observed_streams());
        streams.extend(self.depth.observed_streams());
        streams.extend(self.statistics.observed_streams());
        streams.extend(self.user_data.observed_streams());
        streams
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start every adapter that has subscriptions.
    ///
    /// Every adapter is attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if an adapter is disposed or cannot begin.
    pub async fn start_streaming(&self) -> Result<(), StreamError> {
        let results = [
            self.trades.start_streaming().await,
            self.aggregate_trades.start_streaming().await,
            self.candlesticks.start_streaming().await,
            self.depth.start_streaming().await,
            self.statistics.start_streaming().await,
            self.user_data.start_streaming().await,
        ];
        results.into_iter().collect()
    }

    /// Stop every adapter and wait for their connection loops to exit.
    pub async fn stop_streaming(&self) {
        tokio::join!(
            self.trades.stop_streaming(),
            self.aggregate_trades.stop_streaming(),
            self.candlesticks.stop_streaming(),
            self.depth.stop_streaming(),
            self.statistics.stop_streaming(),
            self.user_data.stop_streaming(),
        );
    }

    /// Dispose every adapter.
    pub async fn dispose(&self) {
        tokio::join!(
            self.trades.dispose(),
            self.aggregate_trades.dispose(),
            self.candlesticks.dispose(),
            self.depth.dispose(),
            self.statistics.dispose(),
            self.user_data.dispose(),
        );
        tracing::info!("WebSocket client manager disposed");
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to raw trades.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_trades(
        &self,
        symbol: &str,
        callback: Callback<Trade>,
    ) -> Result<bool, StreamError> {
        self.trades.subscribe(symbol, &(), callback).await
    }

    /// Unsubscribe from raw trades.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::unsubscribe`].
    pub async fn unsubscribe_trades(
        &self,
        symbol: &str,
        callback: &Callback<Trade>,
    ) -> Result<bool, StreamError> {
        self.trades.unsubscribe(symbol, &(), callback).await
    }

    /// Subscribe to aggregate trades.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_aggregate_trades(
        &self,
        symbol: &str,
        callback: Callback<AggregateTrade>,
    ) -> Result<bool, StreamError> {
        self.aggregate_trades.subscribe(symbol, &(), callback).await
    }

    /// Unsubscribe from aggregate trades.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::unsubscribe`].
    pub async fn unsubscribe_aggregate_trades(
        &self,
        symbol: &str,
        callback: &Callback<AggregateTrade>,
    ) -> Result<bool, StreamError> {
        self.aggregate_trades.unsubscribe(symbol, &(), callback).await
    }

    /// Subscribe to candlesticks of one interval.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_candlesticks(
        &self,
        symbol: &str,
        interval: CandlestickInterval,
        callback: Callback<CandlestickEvent>,
    ) -> Result<bool, StreamError> {
        self.candlesticks.subscribe(symbol, &interval, callback).await
    }

    /// Unsubscribe from candlesticks of one interval.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::unsubscribe`].
    pub async fn unsubscribe_candlesticks(
        &self,
        symbol: &str,
        interval: CandlestickInterval,
        callback: &Callback<CandlestickEvent>,
    ) -> Result<bool, StreamError> {
        self.candlesticks
            .unsubscribe(symbol, &interval, callback)
            .await
    }

    /// Subscribe to depth: diff depth for `None`, partial depth for
    /// `Some(5 | 10 | 20)`.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidDepthLimit`] for other level counts; otherwise
    /// see [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_depth(
        &self,
        symbol: &str,
        levels: Option<u32>,
        callback: Callback<DepthEvent>,
    ) -> Result<bool, StreamError> {
        self.depth.subscribe(symbol, &levels, callback).await
    }

    /// Unsubscribe from depth.
    ///
    /// # Errors
    ///
    /// See [`subscribe_depth`](Self::subscribe_depth).
    pub async fn unsubscribe_depth(
        &self,
        symbol: &str,
        levels: Option<u32>,
        callback: &Callback<DepthEvent>,
    ) -> Result<bool, StreamError> {
        self.depth.unsubscribe(symbol, &levels, callback).await
    }

    /// Subscribe to rolling 24h statistics.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_statistics(
        &self,
        symbol: &str,
        callback: Callback<SymbolStatistics>,
    ) -> Result<bool, StreamError> {
        self.statistics.subscribe(symbol, &(), callback).await
    }

    /// Unsubscribe from rolling 24h statistics.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::unsubscribe`].
    pub async fn unsubscribe_statistics(
        &self,
        symbol: &str,
        callback: &Callback<SymbolStatistics>,
    ) -> Result<bool, StreamError> {
        self.statistics.unsubscribe(symbol, &(), callback).await
    }

    /// Subscribe to a user-data stream by listen key.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::subscribe`].
    pub async fn subscribe_user_data(
        &self,
        listen_key: &str,
        callback: Callback<UserDataEvent>,
    ) -> Result<bool, StreamError> {
        self.user_data.subscribe(listen_key, &(), callback).await
    }

    /// Unsubscribe from a user-data stream.
    ///
    /// # Errors
    ///
    /// See [`StreamClientAdapter::unsubscribe`].
    pub async fn unsubscribe_user_data(
        &self,
        listen_key: &str,
        callback: &Callback<UserDataEvent>,
    ) -> Result<bool, StreamError> {
        self.user_data.unsubscribe(listen_key, &(), callback).await
    }
}
