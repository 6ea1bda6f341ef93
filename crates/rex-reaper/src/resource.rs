use std::fmt;

use rex_store::ContextRef;
use rex_workspace::{WorkspaceError, WorkspaceStore};
use serde::{Deserialize, Serialize};

use crate::event::ReapOutcome;

/// Kind of resource under a timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTag {
    Workspace,
    Context,
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceTag::Workspace => "workspace",
            ResourceTag::Context => "context",
        })
    }
}

/// A handle the reaper knows how to delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackedResource {
    Workspace(WorkspaceStore),
    Context(ContextRef),
}

impl TrackedResource {
    pub fn tag(&self) -> ResourceTag {
        match self {
            TrackedResource::Workspace(_) => ResourceTag::Workspace,
            TrackedResource::Context(_) => ResourceTag::Context,
        }
    }

    /// Identity used to keep one timer per handle. Two handles to the same
    /// workspace or the same stored slot share a key.
    pub fn key(&self) -> String {
        match self {
            TrackedResource::Workspace(store) => format!("workspace:{}", store.id()),
            TrackedResource::Context(reference) => reference.resource_key(),
        }
    }

    /// Invoke the delete operation matching the tag.
    pub(crate) async fn reap(&self) -> ReapOutcome {
        match self {
            TrackedResource::Workspace(store) => match store.delete().await {
                Ok(()) => ReapOutcome::Reaped,
                Err(WorkspaceError::Destroyed { .. }) => ReapOutcome::AlreadyGone,
                Err(e) => ReapOutcome::Failed(e.to_string()),
            },
            TrackedResource::Context(reference) if reference.is_inline() => ReapOutcome::Skipped,
            TrackedResource::Context(reference) => match reference.delete().await {
                Ok(()) => ReapOutcome::Reaped,
                Err(e) if e.is_not_found() => ReapOutcome::AlreadyGone,
                Err(e) => ReapOutcome::Failed(e.to_string()),
            },
        }
    }
}

impl From<WorkspaceStore> for TrackedResource {
    fn from(store: WorkspaceStore) -> Self {
        TrackedResource::Workspace(store)
    }
}

impl From<ContextRef> for TrackedResource {
    fn from(reference: ContextRef) -> Self {
        TrackedResource::Context(reference)
    }
}
