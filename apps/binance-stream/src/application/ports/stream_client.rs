//! Stream Client Port (Capability)
//!
//! One implementation per stream kind. A client owns the callback registry
//! for its kind and turns raw frames into typed events; it knows nothing
//! about connections, which are driven by the client manager.

use std::fmt;

use crate::domain::subscription::{Callback, StreamKey, SubscriptionRegistry, SymbolError};

/// Frame decoding error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Frame was not valid JSON or did not match the expected shape.
    #[error("malformed message: {message}")]
    Json {
        /// Error details.
        message: String,
    },

    /// Payload event type does not belong to this client.
    #[error("unexpected event {event:?} on stream {stream:?}")]
    UnexpectedEvent {
        /// Stream the frame arrived on.
        stream: String,
        /// Event type found in the payload.
        event: String,
    },

    /// A field held a value that could not be interpreted.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Typed stream client for one stream kind.
pub trait StreamClient: Send + Sync + 'static {
    /// Event raised to callbacks.
    type Event: Send + Sync + 'static;

    /// Kind-specific subscription parameter (interval, depth levels, ...).
    type Parameter: Clone + fmt::Debug + Send + Sync + 'static;

    /// Name used in logs and metrics labels.
    const NAME: &'static str;

    /// Map a subscription tuple onto its stream key.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol or parameter is invalid.
    fn stream_key(symbol: &str, parameter: &Self::Parameter) -> Result<StreamKey, SymbolError>;

    /// Callback registry owned by this client.
    fn registry(&self) -> &SubscriptionRegistry<Self::Event>;

    /// Decode a raw frame into its stream name and event.
    ///
    /// Returns `Ok(None)` for frames that carry no event (e.g. control
    /// acknowledgements).
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    fn decode(&self, raw: &str) -> Result<Option<(String, Self::Event)>, CodecError>;

    /// Attach a callback. Returns `false` if it was already attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol or parameter is invalid.
    fn subscribe(
        &self,
        symbol: &str,
        parameter: &Self::Parameter,
        callback: Callback<Self::Event>,
    ) -> Result<bool, SymbolError> {
        let key = Self::stream_key(symbol, parameter)?;
        Ok(self.registry().add(key, callback))
    }

    /// Detach a callback. Returns `false` if it was not attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol or parameter is invalid.
    fn unsubscribe(
        &self,
        symbol: &str,
        parameter: &Self::Parameter,
        callback: &Callback<Self::Event>,
    ) -> Result<bool, SymbolError> {
        let key = Self::stream_key(symbol, parameter)?;
        Ok(self.registry().remove(&key, callback))
    }

    /// Physical stream names to open a connection for.
    fn observed_streams(&self) -> Vec<String> {
        self.registry().observed_streams()
    }

    /// Decode a raw frame and invoke every callback of its stream.
    ///
    /// Callbacks run outside the registry lock. Returns the number of
    /// callbacks invoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    fn handle_message(&self, raw: &str) -> Result<usize, CodecError> {
        let Some((stream, event)) = self.decode(raw)? else {
            return Ok(0);
        };

        let callbacks = self.registry().callbacks_for(&stream);
        for callback in &callbacks {
            callback(&event);
        }
        Ok(callbacks.len())
    }
}
