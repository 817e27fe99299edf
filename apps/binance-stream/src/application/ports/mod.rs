//! Port Interfaces
//!
//! Contracts between the streaming core and the outside world, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: opens a physical connection covering a set of streams
//! - `SnapshotProvider`: REST snapshots used to seed caches
//!
//! ## Capability Ports
//!
//! - `StreamClient`: decodes raw messages for one stream kind and dispatches
//!   them to registered callbacks

mod snapshot_provider;
mod stream_client;
mod stream_transport;

pub use snapshot_provider::{SnapshotError, SnapshotProvider};
pub use stream_client::{CodecError, StreamClient};
pub use stream_transport::{MessageStream, StreamTransport, TransportError};
