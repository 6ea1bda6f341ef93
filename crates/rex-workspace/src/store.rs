use rex_types::OwnerId;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::document::ExplorationDocument;
use crate::entry::Entry;
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::workspace::Workspace;

/// Key under which the exploration document lives in its workspace.
pub const DOCUMENT_KEY: &str = "exploration";

/// One [`ExplorationDocument`] held in a dedicated [`Workspace`].
///
/// Updates go through the workspace worker, so concurrent `update` calls
/// see each other's changes instead of overwriting them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceStore {
    workspace: Workspace,
}

impl WorkspaceStore {
    /// Create a store seeded with `seed`.
    pub async fn init(owner: OwnerId, seed: ExplorationDocument) -> WorkspaceResult<Self> {
        let workspace = Workspace::init(owner);
        let value = encode(&seed)?;
        workspace.put(DOCUMENT_KEY, value).await?;
        Ok(Self { workspace })
    }

    /// Create a store with an empty document.
    pub async fn init_empty(owner: OwnerId) -> WorkspaceResult<Self> {
        Self::init(owner, ExplorationDocument::default()).await
    }

    /// The backing workspace. Other keys in it (e.g. partial output) are
    /// left alone by this store.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn id(&self) -> Uuid {
        self.workspace.id()
    }

    pub fn owner(&self) -> &OwnerId {
        self.workspace.owner()
    }

    /// Current document; a missing document reads as empty.
    pub async fn get(&self) -> WorkspaceResult<ExplorationDocument> {
        match self.workspace.fetch(DOCUMENT_KEY).await? {
            Some(entry) => decode(entry),
            None => Ok(ExplorationDocument::default()),
        }
    }

    /// Replace the document with `f(document)` and return the result.
    pub async fn update<F>(&self, f: F) -> WorkspaceResult<ExplorationDocument>
    where
        F: FnOnce(ExplorationDocument) -> ExplorationDocument + Send + 'static,
    {
        let entry = self
            .workspace
            .try_update(DOCUMENT_KEY, Value::Null, move |entry| {
                let doc = decode(entry)?;
                Ok(Entry::Json(encode(&f(doc))?))
            })
            .await?;
        debug!(workspace = %self.id(), "exploration document updated");
        decode(entry)
    }

    /// Progress briefing bounded to `max_chars` bytes.
    pub async fn summary(&self, max_chars: usize) -> WorkspaceResult<String> {
        Ok(self.get().await?.summary(max_chars))
    }

    /// Destroy the backing workspace.
    pub async fn delete(&self) -> WorkspaceResult<()> {
        self.workspace.destroy().await
    }

    pub fn is_deleted(&self) -> bool {
        self.workspace.is_destroyed()
    }
}

fn encode(doc: &ExplorationDocument) -> WorkspaceResult<Value> {
    doc.to_value()
        .map_err(|e| WorkspaceError::Serialization(e.to_string()))
}

fn decode(entry: Entry) -> WorkspaceResult<ExplorationDocument> {
    match entry {
        Entry::Json(value) => ExplorationDocument::from_value(value)
            .map_err(|e| WorkspaceError::Serialization(e.to_string())),
        other => Err(WorkspaceError::UnexpectedEntry {
            key: DOCUMENT_KEY.to_string(),
            expected: "json",
            found: other.kind(),
        }),
    }
}
