//! Combined Stream WebSocket Transport
//!
//! Opens `{base_url}/stream?streams=a/b/c` and forwards text frames until the
//! server closes, the socket faults, nothing arrives within the idle
//! timeout, or the caller cancels.
//!
//! # Stream URL
//!
//! - Production: `wss://stream.binance.com:9443`
//! - Market data only: `wss://data-stream.binance.vision`
//!
//! Binance pings every 20 seconds and drops connections that do not pong
//! within a minute; pings are answered here. Connections are also closed by
//! the server after 24 hours, which simply ends the message stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MessageStream, StreamTransport, TransportError};

/// Default combined stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Default idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Base URL without path (e.g. `wss://stream.binance.com:9443`).
    pub base_url: String,
    /// Longest silence tolerated before the connection is failed.
    pub idle_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STREAM_URL.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl WebSocketConfig {
    /// Combined stream URL for a set of streams.
    #[must_use]
    pub fn combined_url(&self, streams: &[String]) -> String {
        format!(
            "{}/stream?streams={}",
            self.base_url.trim_end_matches('/'),
            streams.join("/")
        )
    }
}

/// `tokio-tungstenite` implementation of [`StreamTransport`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a transport.
    #[must_use]
    pub const fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(
        &self,
        streams: &[String],
        cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError> {
        if streams.is_empty() {
            return Err(TransportError::NoStreams);
        }

        let url = self.config.combined_url(streams);
        tracing::info!(%url, "Connecting to combined stream");

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                message: e.to_string(),
            })?;

        let (mut write, mut read) = socket.split();
        let (tx, rx) = mpsc::unbounded::<Result<String, TransportError>>();
        let idle_timeout = self.config.idle_timeout;

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    frame = tokio::time::timeout(idle_timeout, read.next()) => frame,
                };

                let forwarded = match frame {
                    Err(_elapsed) => {
                        tracing::warn!(seconds = idle_timeout.as_secs(), "Stream idle timeout");
                        let _ = tx.unbounded_send(Err(TransportError::IdleTimeout {
                            seconds: idle_timeout.as_secs(),
                        }));
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => tx.unbounded_send(Ok(text.as_str().to_owned())),
                    Ok(Some(Ok(Message::Binary(bytes)))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => tx.unbounded_send(Ok(text)),
                        Err(_) => {
                            tracing::debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                            Ok(())
                        }
                    },
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            let _ = tx.unbounded_send(Err(TransportError::Protocol {
                                message: e.to_string(),
                            }));
                            break;
                        }
                        Ok(())
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        tracing::info!(?frame, "Server sent close frame");
                        break;
                    }
                    Ok(Some(Ok(_))) => Ok(()),
                    Ok(Some(Err(e))) => {
                        let _ = tx.unbounded_send(Err(TransportError::Protocol {
                            message: e.to_string(),
                        }));
                        break;
                    }
                    Ok(None) => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                };

                // Consumer went away
                if forwarded.is_err() {
                    break;
                }
            }
        });

        Ok(rx.boxed())
    }
}
