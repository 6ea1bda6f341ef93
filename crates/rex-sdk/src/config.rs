use std::path::Path;
use std::time::Duration;

use rex_store::{ContextStoreConfig, DEFAULT_INLINE_THRESHOLD};
use rex_workspace::CollectorConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`RequestScope`](crate::RequestScope).
///
/// Every field has a default, so a partial TOML file is enough:
///
/// ```toml
/// default_ttl_ms = 60000
/// reaper_name = "batch-reaper"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RexConfig {
    /// Payloads smaller than this are kept inline in their ref.
    pub inline_threshold_bytes: usize,
    /// TTL applied to every resource a scope creates.
    pub default_ttl_ms: u64,
    /// Name of the reaper scopes register with.
    pub reaper_name: String,
    /// Tail kept per streamed chunk.
    pub partial_max_chars: usize,
    /// How often streamed partials are flushed into the workspace.
    pub partial_flush_interval_ms: u64,
}

impl Default for RexConfig {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD,
            default_ttl_ms: 300_000,
            reaper_name: "rex-reaper".to_string(),
            partial_max_chars: 4000,
            partial_flush_interval_ms: 250,
        }
    }
}

impl RexConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_ms == 0 {
            return Err(ConfigError::Invalid("default_ttl_ms must be positive".into()));
        }
        if self.partial_flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "partial_flush_interval_ms must be positive".into(),
            ));
        }
        if self.reaper_name.trim().is_empty() {
            return Err(ConfigError::Invalid("reaper_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn context_store_config(&self) -> ContextStoreConfig {
        ContextStoreConfig::with_inline_threshold(self.inline_threshold_bytes)
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            max_chars_per_chunk: self.partial_max_chars,
            flush_interval: Duration::from_millis(self.partial_flush_interval_ms),
        }
    }
}
