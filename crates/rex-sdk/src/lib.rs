//! High-level SDK for recursive exploration.
//!
//! [`RequestScope`] wires one request's workspace, budget and context store
//! together and registers everything it creates with a [`Reaper`], so an
//! abandoned request still releases its memory. [`RexConfig`] carries the
//! tunables and loads from TOML.

pub mod config;
pub mod error;
pub mod scope;

pub use config::RexConfig;
pub use error::{ConfigError, SdkError, SdkResult};
pub use scope::{RequestScope, ScopeLimits};

// Re-export key types
pub use rex_budget::{BudgetState, BudgetStore, Reservation};
pub use rex_reaper::{ReapEvent, ReapOutcome, Reaper, ReaperRegistry, TrackedResource};
pub use rex_store::{Backend, ContextRef, ContextStore, PutOptions};
pub use rex_types::{Fingerprint, OwnerId};
pub use rex_workspace::{
    ExplorationDocument, Note, PartialCollector, PartialEvent, ResultStatus, TaskResult,
    Workspace, WorkspaceStore,
};
