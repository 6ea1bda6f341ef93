use serde::{Deserialize, Serialize};

/// Payloads smaller than this many bytes are stored inline.
pub const DEFAULT_INLINE_THRESHOLD: usize = 16 * 1024;

/// Configuration for a [`ContextStore`](crate::ContextStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextStoreConfig {
    /// Payloads strictly smaller than this stay inline in the ref.
    pub inline_threshold: usize,
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl ContextStoreConfig {
    pub fn with_inline_threshold(inline_threshold: usize) -> Self {
        Self { inline_threshold }
    }
}
