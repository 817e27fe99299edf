//! Stream Client Adapter
//!
//! Binds one [`StreamClient`] to a [`RetryTaskController`] and a
//! [`StreamTransport`]. Every subscription change cancels the running
//! connection loop, mutates the client's registry, and restarts the loop
//! against the new set of observed streams.
//!
//! # Connection Loop
//!
//! ```text
//! observed streams ──► transport.open ──► Opened{epoch} ──► frames ──► client.handle_message
//!                                                             │
//!                           close / fault / cancel ◄──────────┘──► Closed{epoch}
//! ```
//!
//! The retry controller re-runs the loop after a close or fault, so a
//! transport failure turns into a pause and a fresh connection with the
//! next epoch.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::task_controller::{
    Cancelled, RetryTaskController, TaskAction, TaskError, TaskEvent, task_action,
};
use crate::application::ports::{StreamClient, StreamTransport};
use crate::domain::subscription::{Callback, SymbolError};
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

const CONNECTION_CHANNEL_CAPACITY: usize = 64;

/// Subscription management error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Symbol was empty or whitespace.
    #[error("symbol must not be empty")]
    EmptySymbol,

    /// Symbol was malformed.
    #[error("invalid symbol: {symbol:?}")]
    InvalidSymbol {
        /// Rejected symbol.
        symbol: String,
    },

    /// Partial depth level count not supported.
    #[error("invalid depth limit: {limit}")]
    InvalidDepthLimit {
        /// Rejected level count.
        limit: u32,
    },

    /// The adapter or manager was disposed.
    #[error("stream client has been disposed")]
    Disposed,

    /// The connection loop could not be started.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl StreamError {
    /// Whether this is an input validation failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptySymbol | Self::InvalidSymbol { .. } | Self::InvalidDepthLimit { .. }
        )
    }
}

impl From<SymbolError> for StreamError {
    fn from(error: SymbolError) -> Self {
        match error {
            SymbolError::Empty => Self::EmptySymbol,
            SymbolError::Invalid(symbol) => Self::InvalidSymbol { symbol },
            SymbolError::InvalidDepthLimit(limit) => Self::InvalidDepthLimit { limit },
        }
    }
}

/// Connection lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection was opened.
    Opened {
        /// Monotonic connection counter of the adapter.
        epoch: u64,
        /// Streams carried by the connection.
        streams: Vec<String>,
    },
    /// A connection was closed, faulted or cancelled.
    Closed {
        /// Epoch of the closed connection.
        epoch: u64,
    },
}

/// Handler for non-validation failures.
pub type ErrorHandler = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// Settings shared by every adapter of a manager.
#[derive(Default)]
pub struct SharedSettings {
    auto_streaming_disabled: AtomicBool,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl fmt::Debug for SharedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSettings")
            .field("auto_streaming_disabled", &self.auto_streaming_disabled())
            .field("error_handler", &self.error_handler.read().is_some())
            .finish()
    }
}

impl SharedSettings {
    /// Whether subscription changes leave the stream stopped.
    #[must_use]
    pub fn auto_streaming_disabled(&self) -> bool {
        self.auto_streaming_disabled.load(Ordering::SeqCst)
    }

    /// Enable or disable automatic streaming.
    pub fn set_auto_streaming_disabled(&self, disabled: bool) {
        self.auto_streaming_disabled.store(disabled, Ordering::SeqCst);
    }

    /// Install (or clear) the error handler.
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        *self.error_handler.write() = handler;
    }

    fn report(&self, client: &'static str, error: &StreamError) {
        tracing::error!(client, error = %error, "Stream operation failed");
        let handler = self.error_handler.read().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionStatus {
    epoch: u64,
    open_streams: Option<Vec<String>>,
}

// =============================================================================
// Stream Client Adapter
// =============================================================================

/// Drives one stream client over the transport with automatic restarts.
pub struct StreamClientAdapter<C: StreamClient> {
    client: Arc<C>,
    transport: Arc<dyn StreamTransport>,
    controller: RetryTaskController,
    settings: Arc<SharedSettings>,
    op_lock: tokio::sync::Mutex<()>,
    connections: broadcast::Sender<ConnectionEvent>,
    status: Arc<Mutex<ConnectionStatus>>,
    disposed: AtomicBool,
}

impl<C: StreamClient> fmt::Debug for StreamClientAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClientAdapter")
            .field("client", &C::NAME)
            .field("controller", &self.controller)
            .field("status", &*self.status.lock())
            .finish_non_exhaustive()
    }
}

impl<C: StreamClient> StreamClientAdapter<C> {
    /// Create an adapter with its own settings.
    #[must_use]
    pub fn new(client: C, transport: Arc<dyn StreamTransport>) -> Self {
        Self::with_settings(client, transport, Arc::new(SharedSettings::default()))
    }

    /// Create an adapter sharing a manager's settings.
    #[must_use]
    pub fn with_settings(
        client: C,
        transport: Arc<dyn StreamTransport>,
        settings: Arc<SharedSettings>,
    ) -> Self {
        let (connections, _) = broadcast::channel(CONNECTION_CHANNEL_CAPACITY);
        Self {
            client: Arc::new(client),
            transport,
            controller: RetryTaskController::new(C::NAME),
            settings,
            op_lock: tokio::sync::Mutex::new(()),
            connections,
            status: Arc::new(Mutex::new(ConnectionStatus::default())),
            disposed: AtomicBool::new(false),
        }
    }

    /// The wrapped client.
    #[must_use]
    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Settings shared with the owning manager.
    #[must_use]
    pub const fn settings(&self) -> &Arc<SharedSettings> {
        &self.settings
    }

    /// Physical streams currently subscribed.
    #[must_use]
    pub fn observed_streams(&self) -> Vec<String> {
        self.client.observed_streams()
    }

    /// Whether the connection loop is running.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.controller.is_active()
    }

    /// Epoch of the most recently opened connection (0 before the first).
    #[must_use]
    pub fn connection_epoch(&self) -> u64 {
        self.status.lock().epoch
    }

    /// Whether an open connection currently carries `stream`.
    #[must_use]
    pub fn is_stream_open(&self, stream: &str) -> bool {
        self.status
            .lock()
            .open_streams
            .as_ref()
            .is_some_and(|streams| streams.iter().any(|s| s == stream))
    }

    /// Subscribe to connection lifecycle events.
    #[must_use]
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connections.subscribe()
    }

    /// Subscribe to retry controller events.
    #[must_use]
    pub fn subscribe_task_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.controller.subscribe_events()
    }

    /// Current retry delay.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.controller.retry_delay()
    }

    /// Change the retry delay.
    pub fn set_retry_delay(&self, delay: Duration) {
        self.controller.set_retry_delay(delay);
    }

    /// Attach a callback and restart streaming over the new stream set.
    ///
    /// Returns `false` if the callback was already attached.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any state changes.
    /// [`StreamError::Disposed`] and controller failures are also passed to
    /// the error handler; the subscription itself is kept.
    pub async fn subscribe(
        &self,
        symbol: &str,
        parameter: &C::Parameter,
        callback: Callback<C::Event>,
    ) -> Result<bool, StreamError> {
        let key = C::stream_key(symbol, parameter)?;

        let _guard = self.op_lock.lock().await;
        self.ensure_not_disposed()?;
        self.controller.cancel().await;

        let added = self.client.subscribe(symbol, parameter, callback)?;
        tracing::debug!(client = C::NAME, stream = %key, added, "Subscribed");

        self.restart_if_needed()?;
        Ok(added)
    }

    /// Detach a callback and restart streaming over the remaining streams.
    ///
    /// Returns `false` if the callback was not attached.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn unsubscribe(
        &self,
        symbol: &str,
        parameter: &C::Parameter,
        callback: &Callback<C::Event>,
    ) -> Result<bool, StreamError> {
        let key = C::stream_key(symbol, parameter)?;

        let _guard = self.op_lock.lock().await;
        self.ensure_not_disposed()?;
        self.controller.cancel().await;

        let removed = self.client.unsubscribe(symbol, parameter, callback)?;
        tracing::debug!(client = C::NAME, stream = %key, removed, "Unsubscribed");

        self.restart_if_needed()?;
        Ok(removed)
    }

    /// Start streaming if anything is subscribed, regardless of the
    /// auto-streaming setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is disposed or the loop cannot start.
    pub async fn start_streaming(&self) -> Result<(), StreamError> {
        let _guard = self.op_lock.lock().await;
        self.ensure_not_disposed()?;

        if self.controller.is_active() || self.client.observed_streams().is_empty() {
            return Ok(());
        }
        self.begin()
    }

    /// Stop streaming and wait for the connection loop to exit.
    pub async fn stop_streaming(&self) {
        let _guard = self.op_lock.lock().await;
        self.controller.cancel().await;
    }

    /// Stop streaming for good and drop every subscription.
    pub async fn dispose(&self) {
        let _guard = self.op_lock.lock().await;
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.controller.dispose().await;
        self.client.registry().clear();
        tracing::debug!(client = C::NAME, "Stream client disposed");
    }

    fn ensure_not_disposed(&self) -> Result<(), StreamError> {
        if self.disposed.load(Ordering::SeqCst) {
            let error = StreamError::Disposed;
            self.settings.report(C::NAME, &error);
            return Err(error);
        }
        Ok(())
    }

    fn restart_if_needed(&self) -> Result<(), StreamError> {
        if self.settings.auto_streaming_disabled()
            || self.controller.is_active()
            || self.client.observed_streams().is_empty()
        {
            return Ok(());
        }
        self.begin()
    }

    fn begin(&self) -> Result<(), StreamError> {
        self.controller
            .begin(Some(self.connection_loop()))
            .map_err(|error| {
                let error = StreamError::from(error);
                self.settings.report(C::NAME, &error);
                error
            })
    }

    fn connection_loop(&self) -> TaskAction {
        let client = Arc::clone(&self.client);
        let transport = Arc::clone(&self.transport);
        let connections = self.connections.clone();
        let status = Arc::clone(&self.status);

        task_action(move |token: CancellationToken| {
            pump(
                Arc::clone(&client),
                Arc::clone(&transport),
                connections.clone(),
                Arc::clone(&status),
                token,
            )
        })
    }
}

enum Next {
    Frame(String),
    Ended,
    Failed(anyhow::Error),
    Cancelled,
}

async fn pump<C: StreamClient>(
    client: Arc<C>,
    transport: Arc<dyn StreamTransport>,
    connections: broadcast::Sender<ConnectionEvent>,
    status: Arc<Mutex<ConnectionStatus>>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let streams = client.observed_streams();
    if streams.is_empty() {
        token.cancelled().await;
        return Err(Cancelled.into());
    }

    let mut messages = tokio::select! {
        () = token.cancelled() => return Err(Cancelled.into()),
        opened = transport.open(&streams, token.clone()) => opened?,
    };

    let epoch = {
        let mut status = status.lock();
        status.epoch += 1;
        status.open_streams = Some(streams.clone());
        status.epoch
    };
    metrics::record_connection_opened(C::NAME);
    tracing::info!(client = C::NAME, epoch, streams = streams.len(), "Stream connection opened");
    let _ = connections.send(ConnectionEvent::Opened {
        epoch,
        streams,
    });

    let outcome = loop {
        let next = tokio::select! {
            () = token.cancelled() => Next::Cancelled,
            frame = messages.next() => match frame {
                Some(Ok(raw)) => Next::Frame(raw),
                Some(Err(error)) => Next::Failed(error.into()),
                None => Next::Ended,
            },
        };

        match next {
            Next::Frame(raw) => {
                metrics::record_message_received(C::NAME);
                if let Err(error) = client.handle_message(&raw) {
                    metrics::record_decode_error(C::NAME);
                    tracing::warn!(client = C::NAME, error = %error, "Dropping undecodable frame");
                }
            }
            Next::Ended => break Ok(()),
            Next::Failed(error) => break Err(error),
            Next::Cancelled => break Err(Cancelled.into()),
        }
    };

    {
        let mut status = status.lock();
        if status.epoch == epoch {
            status.open_streams = None;
        }
    }
    metrics::record_connection_closed(C::NAME);
    tracing::info!(client = C::NAME, epoch, "Stream connection closed");
    let _ = connections.send(ConnectionEvent::Closed { epoch });

    outcome
}

// =============================================================================
// Tests
// =============================================================================
