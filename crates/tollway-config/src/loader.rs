use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// resolved, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistent setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_relay_config()?;
        self.validate_media_config()?;
        Ok(())
    }

    fn validate_relay_config(&self) -> anyhow::Result<()> {
        if self.relay.streaming_timeout.is_zero() {
            anyhow::bail!("relay.streaming_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_media_config(&self) -> anyhow::Result<()> {
        let Some(ref worker) = self.media.worker else {
            return Ok(());
        };

        if !matches!(worker.url.scheme(), "http" | "https") {
            anyhow::bail!("media.worker.url must be an http(s) URL, got `{}`", worker.url);
        }

        if worker.key.expose_secret().is_empty() {
            anyhow::bail!("media.worker.key must not be empty when a worker url is set");
        }

        Ok(())
    }
}
