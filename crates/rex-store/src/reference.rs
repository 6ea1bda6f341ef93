use std::fmt;

use bytes::Bytes;
use rex_types::Fingerprint;
use rex_workspace::{Entry, Workspace, WorkspaceError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContextError, ContextResult};
use crate::table::SharedTable;

/// Storage tier a payload was placed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Inline,
    SharedTable,
    Workspace,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Inline => "inline",
            Backend::SharedTable => "shared-table",
            Backend::Workspace => "workspace",
        })
    }
}

/// Self-describing reference to a stored payload.
///
/// Refs are immutable values and safe to share by value. A `fingerprint` of
/// `None` marks a legacy ref: it fetches without verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextRef {
    Inline {
        data: Bytes,
        size_bytes: u64,
        fingerprint: Option<Fingerprint>,
    },
    Table {
        table: SharedTable,
        key: String,
        size_bytes: u64,
        fingerprint: Option<Fingerprint>,
    },
    Workspace {
        workspace: Workspace,
        key: String,
        size_bytes: u64,
        fingerprint: Option<Fingerprint>,
    },
}

impl ContextRef {
    pub fn backend(&self) -> Backend {
        match self {
            ContextRef::Inline { .. } => Backend::Inline,
            ContextRef::Table { .. } => Backend::SharedTable,
            ContextRef::Workspace { .. } => Backend::Workspace,
        }
    }

    /// Size recorded at write time. Never touches the backing storage.
    pub fn size_bytes(&self) -> u64 {
        match self {
            ContextRef::Inline { size_bytes, .. }
            | ContextRef::Table { size_bytes, .. }
            | ContextRef::Workspace { size_bytes, .. } => *size_bytes,
        }
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            ContextRef::Inline { fingerprint, .. }
            | ContextRef::Table { fingerprint, .. }
            | ContextRef::Workspace { fingerprint, .. } => *fingerprint,
        }
    }

    /// Storage key; inline refs have none.
    pub fn key(&self) -> Option<&str> {
        match self {
            ContextRef::Inline { .. } => None,
            ContextRef::Table { key, .. } | ContextRef::Workspace { key, .. } => Some(key),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ContextRef::Inline { .. })
    }

    /// Stable identity of the underlying storage slot, used to de-duplicate
    /// expiry timers.
    pub fn resource_key(&self) -> String {
        match self {
            ContextRef::Inline { data, fingerprint, .. } => {
                let fp = fingerprint.unwrap_or_else(|| Fingerprint::of(data));
                format!("context:inline:{}", fp.to_hex())
            }
            ContextRef::Table { table, key, .. } => {
                format!("context:table:{}:{key}", table.id())
            }
            ContextRef::Workspace { workspace, key, .. } => {
                format!("context:workspace:{}:{key}", workspace.id())
            }
        }
    }

    /// Fetch and verify the full payload.
    pub async fn fetch(&self) -> ContextResult<Bytes> {
        let data = match self {
            ContextRef::Inline { data, .. } => data.clone(),
            ContextRef::Table { table, key, .. } => {
                table.get(key).ok_or_else(|| ContextError::NotFound { key: key.clone() })?
            }
            ContextRef::Workspace { workspace, key, .. } => match workspace.fetch(key.as_str()).await? {
                Some(Entry::Blob(b)) => b,
                Some(other) => {
                    return Err(WorkspaceError::UnexpectedEntry {
                        key: key.clone(),
                        expected: "blob",
                        found: other.kind(),
                    }
                    .into())
                }
                None => return Err(ContextError::NotFound { key: key.clone() }),
            },
        };
        self.verify(&data)?;
        Ok(data)
    }

    /// Fetch, verify, then slice. The range is clamped to the payload.
    pub async fn fetch_range(&self, offset: u64, length: u64) -> ContextResult<Bytes> {
        let data = self.fetch().await?;
        let total = data.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
        let len = usize::try_from(length).unwrap_or(usize::MAX);
        let end = start.saturating_add(len).min(total);
        Ok(data.slice(start..end))
    }

    /// Remove the backing data. Inline refs have nothing to remove.
    pub async fn delete(&self) -> ContextResult<()> {
        match self {
            ContextRef::Inline { .. } => Ok(()),
            ContextRef::Table { table, key, .. } => {
                if table.remove(key) {
                    debug!(key = %key, "context deleted from shared table");
                    Ok(())
                } else {
                    Err(ContextError::NotFound { key: key.clone() })
                }
            }
            ContextRef::Workspace { workspace, key, .. } => {
                if workspace.delete_key(key.as_str()).await? {
                    debug!(key = %key, workspace = %workspace.id(), "context deleted from workspace");
                    Ok(())
                } else {
                    Err(ContextError::NotFound { key: key.clone() })
                }
            }
        }
    }

    fn verify(&self, data: &[u8]) -> ContextResult<()> {
        let Some(expected) = self.fingerprint() else {
            return Ok(());
        };
        let computed = Fingerprint::of(data);
        if computed != expected {
            return Err(ContextError::FingerprintMismatch {
                key: self.key().unwrap_or("<inline>").to_string(),
                expected,
                computed,
            });
        }
        Ok(())
    }
}
