use serde::{Deserialize, Serialize};

use crate::resource::ResourceTag;

/// What happened when a timer fired.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum ReapOutcome {
    /// The resource was deleted.
    Reaped,
    /// The resource had already been deleted by its owner.
    AlreadyGone,
    /// Nothing to delete (inline context).
    Skipped,
    /// The delete failed for a reason other than absence.
    Failed(String),
}

impl ReapOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReapOutcome::Failed(_))
    }
}

/// Published on a reaper's event stream after every expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapEvent {
    pub reaper: String,
    pub key: String,
    pub tag: ResourceTag,
    pub outcome: ReapOutcome,
}
