#![allow(clippy::must_use_candidate)]

mod env;
mod holder;
mod loader;
pub mod media;
pub mod relay;
pub mod telemetry;

use serde::Deserialize;

pub use holder::ConfigHolder;
pub use media::*;
pub use relay::*;
pub use telemetry::*;

/// Top-level Tollway configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Stream relay and upstream client settings
    #[serde(default)]
    pub relay: RelayConfig,
    /// Remote media ingestion settings
    #[serde(default)]
    pub media: MediaConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
