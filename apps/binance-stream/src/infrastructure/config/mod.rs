//! Configuration Module
//!
//! Environment-driven configuration for the stream clients and the price
//! chart binary.

mod settings;

pub use settings::{
    ChartSettings, ConfigError, EndpointSettings, MAX_CHART_LIMIT, StreamConfig,
    StreamingSettings,
};
