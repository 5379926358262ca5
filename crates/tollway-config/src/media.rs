use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Remote media ingestion configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Maximum remote media size in MiB (zero or negative disables the ceiling)
    #[serde(default = "default_max_image_size_mib")]
    pub max_image_size_mib: i64,
    /// Timeout for a whole media download
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub request_timeout: Duration,
    /// Whether remote image URLs are inlined as base64 data URLs
    #[serde(default = "default_base64_enabled")]
    pub base64_enabled: bool,
    /// Domains the upstream fetches directly, never inlined
    #[serde(default = "default_direct_fetch_domains")]
    pub direct_fetch_domains: Vec<String>,
    /// Download through a relay worker instead of fetching directly
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
}

/// Relay worker that fetches media on the gateway's behalf
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Worker endpoint
    pub url: Url,
    /// Shared secret the worker validates
    pub key: SecretString,
}

impl MediaConfig {
    /// Size ceiling in bytes, `None` when disabled
    pub fn max_image_bytes(&self) -> Option<u64> {
        u64::try_from(self.max_image_size_mib)
            .ok()
            .filter(|mib| *mib > 0)
            .map(|mib| mib.saturating_mul(1024 * 1024))
    }

    /// Whether a URL points at a domain the upstream can fetch itself
    ///
    /// Matches case-insensitively anywhere in the URL. An empty list matches nothing.
    pub fn is_direct_fetch_domain(&self, url: &str) -> bool {
        if self.direct_fetch_domains.is_empty() {
            return false;
        }

        let url = url.to_lowercase();
        self.direct_fetch_domains
            .iter()
            .any(|domain| url.contains(&domain.to_lowercase()))
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_image_size_mib: default_max_image_size_mib(),
            request_timeout: default_request_timeout(),
            base64_enabled: default_base64_enabled(),
            direct_fetch_domains: default_direct_fetch_domains(),
            worker: None,
        }
    }
}

const fn default_max_image_size_mib() -> i64 {
    20
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

const fn default_base64_enabled() -> bool {
    true
}

fn default_direct_fetch_domains() -> Vec<String> {
    vec!["aliyuncs.com".to_owned(), "windows.net".to_owned()]
}
