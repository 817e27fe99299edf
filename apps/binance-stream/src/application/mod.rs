//! Application Layer - Use cases and port definitions.
//!
//! Ports describe the transport, snapshot source and stream clients; services
//! drive them: task controllers, client adapters and synchronized caches.

/// Port interfaces for external systems (transport, REST snapshots, clients).
pub mod ports;

/// Task controllers, client adapters and caches.
pub mod services;
