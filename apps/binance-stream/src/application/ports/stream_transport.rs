//! Stream Transport Port (Driven Port)
//!
//! A transport opens one physical connection carrying several logical
//! streams and yields their raw text frames until the peer closes, the
//! connection faults, or the caller cancels.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Raw text frames from an open connection.
///
/// The stream ends when the connection closes cleanly or `cancel` fires.
pub type MessageStream = BoxStream<'static, Result<String, TransportError>>;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// The connection faulted after it was established.
    #[error("protocol error: {message}")]
    Protocol {
        /// Error details.
        message: String,
    },

    /// Nothing was received within the idle timeout.
    #[error("no message received for {seconds}s")]
    IdleTimeout {
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// No streams were requested.
    #[error("no streams to open")]
    NoStreams,
}

/// Opens physical streaming connections.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a connection covering `streams`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn open(
        &self,
        streams: &[String],
        cancel: CancellationToken,
    ) -> Result<MessageStream, TransportError>;
}
