use std::time::Duration;

use serde::Deserialize;

/// Stream relay and upstream client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Inactivity timeout between upstream stream frames
    #[serde(
        default = "default_streaming_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub streaming_timeout: Duration,
    /// Whole-request timeout for buffered upstream calls (zero disables)
    #[serde(default, deserialize_with = "duration_str::deserialize_duration")]
    pub relay_timeout: Duration,
    /// Time-to-first-byte timeout for streaming upstream calls (zero disables)
    #[serde(default, deserialize_with = "duration_str::deserialize_duration")]
    pub stream_relay_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            streaming_timeout: default_streaming_timeout(),
            relay_timeout: Duration::ZERO,
            stream_relay_timeout: Duration::ZERO,
        }
    }
}

const fn default_streaming_timeout() -> Duration {
    Duration::from_secs(60)
}
