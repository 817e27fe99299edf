//! Application Services
//!
//! - `task_controller`: cancellable loop bodies with fixed-delay retry
//! - `client_manager`: stream client adapters that restart the connection
//!   loop on every subscription change
//! - `cache`: REST-seeded views kept consistent with live events

pub mod cache;
pub mod client_manager;
pub mod task_controller;

pub use client_manager::{
    ConnectionEvent, ErrorHandler, SharedSettings, StreamClientAdapter, StreamError,
};
pub use task_controller::{
    Cancelled, DEFAULT_RETRY_DELAY, RetryTaskController, TaskAction, TaskController, TaskError,
    TaskEvent, TaskState, is_cancellation, task_action,
};
