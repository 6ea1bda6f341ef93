//! Worker-owned workspaces for the recursive exploration substrate.
//!
//! A [`Workspace`] is a key/value table owned by exactly one tokio task.
//! Every call is a message to that task, so mutations are linearized without
//! locks: concurrent [`Workspace::update`] calls queue at the worker rather
//! than racing on shared memory.
//!
//! # Layers
//!
//! - [`Workspace`] -- raw table of [`Entry`] values (JSON or bytes)
//! - [`WorkspaceStore`] -- one [`ExplorationDocument`] under a fixed key,
//!   with a bounded progress [`summary`](WorkspaceStore::summary)
//! - [`PartialCollector`] -- buffers streamed text per chunk and flushes
//!   truncated snapshots into a workspace
//!
//! # Design Rules
//!
//! 1. The table is only ever touched by its worker.
//! 2. After `destroy`, every operation fails with
//!    [`WorkspaceError::Destroyed`]; nothing silently returns empty data.
//! 3. A missing key is `None`, never an error.
//! 4. All constructors spawn tasks and must run inside a tokio runtime.

pub mod document;
pub mod entry;
pub mod error;
pub mod partial;
pub mod store;
pub mod workspace;

pub use document::{
    ChunkProjection, ChunkSpec, ExplorationDocument, Note, ResultStatus, TaskResult,
};
pub use entry::Entry;
pub use error::{WorkspaceError, WorkspaceResult};
pub use partial::{
    ChunkPartial, CollectorConfig, PartialCollector, PartialEvent, PartialKind, PARTIALS_KEY,
};
pub use store::{WorkspaceStore, DOCUMENT_KEY};
pub use workspace::Workspace;
