use bytes::Bytes;
use rex_types::{Fingerprint, OwnerId};
use rex_workspace::{Entry, Workspace};
use tracing::debug;
use uuid::Uuid;

use crate::config::ContextStoreConfig;
use crate::error::ContextResult;
use crate::reference::ContextRef;
use crate::table::SharedTable;

/// Per-put options.
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    /// Promote oversized payloads into this workspace instead of the
    /// shared table.
    pub workspace: Option<Workspace>,
    /// Override the store-wide inline threshold for this put.
    pub inline_threshold: Option<usize>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_inline_threshold(mut self, threshold: usize) -> Self {
        self.inline_threshold = Some(threshold);
        self
    }
}

/// Tiered content store.
///
/// Clones share the same shared table. Every operation other than
/// [`put`](Self::put) is driven entirely by the [`ContextRef`] it is given,
/// so refs produced by one store handle work with any other.
#[derive(Clone, Debug, Default)]
pub struct ContextStore {
    table: SharedTable,
    config: ContextStoreConfig,
}

impl ContextStore {
    pub fn new(config: ContextStoreConfig) -> Self {
        Self {
            table: SharedTable::new(),
            config,
        }
    }

    /// Build a store over an existing table.
    pub fn with_table(table: SharedTable, config: ContextStoreConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &ContextStoreConfig {
        &self.config
    }

    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    /// Entries currently held in the shared table.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Payload bytes currently held in the shared table.
    pub fn table_bytes(&self) -> u64 {
        self.table.total_bytes()
    }

    /// Store `payload` for `owner`, choosing the tier by size.
    pub async fn put(
        &self,
        payload: impl Into<Bytes>,
        owner: &OwnerId,
        opts: PutOptions,
    ) -> ContextResult<ContextRef> {
        let data: Bytes = payload.into();
        let size_bytes = data.len() as u64;
        let fingerprint = Some(Fingerprint::of(&data));
        let threshold = opts.inline_threshold.unwrap_or(self.config.inline_threshold);

        let reference = if data.len() < threshold {
            ContextRef::Inline {
                data,
                size_bytes,
                fingerprint,
            }
        } else if let Some(workspace) = opts.workspace {
            let key = storage_key(owner);
            workspace.put(key.as_str(), Entry::Blob(data)).await?;
            ContextRef::Workspace {
                workspace,
                key,
                size_bytes,
                fingerprint,
            }
        } else {
            let key = storage_key(owner);
            self.table.insert(key.clone(), data);
            ContextRef::Table {
                table: self.table.clone(),
                key,
                size_bytes,
                fingerprint,
            }
        };

        debug!(
            owner = %owner,
            tier = %reference.backend(),
            size = size_bytes,
            "context stored"
        );
        Ok(reference)
    }

    /// Fetch and verify a payload.
    pub async fn fetch(&self, reference: &ContextRef) -> ContextResult<Bytes> {
        reference.fetch().await
    }

    /// Fetch, verify, and slice a payload.
    pub async fn fetch_range(
        &self,
        reference: &ContextRef,
        offset: u64,
        length: u64,
    ) -> ContextResult<Bytes> {
        reference.fetch_range(offset, length).await
    }

    /// Recorded payload size.
    pub fn size(&self, reference: &ContextRef) -> u64 {
        reference.size_bytes()
    }

    /// Delete the backing data of a promoted ref.
    pub async fn delete(&self, reference: &ContextRef) -> ContextResult<()> {
        reference.delete().await
    }
}

fn storage_key(owner: &OwnerId) -> String {
    format!("ctx:{owner}:{}", Uuid::now_v7())
}
