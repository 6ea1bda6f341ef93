use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the request or exploration that owns a resource.
///
/// Owners are opaque to the substrate: they appear in log fields and in the
/// storage keys generated for promoted payloads, nothing more.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    /// An empty string becomes `"anonymous"`.
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self("anonymous".into())
        } else {
            Self(s.to_string())
        }
    }
}
