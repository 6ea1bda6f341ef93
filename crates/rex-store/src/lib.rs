//! Tiered, fingerprinted context storage.
//!
//! Large intermediate content (document slices, tool output, child
//! transcripts) is parked here instead of being passed around by value.
//! [`ContextStore::put`] picks a tier by size and returns a [`ContextRef`]
//! that describes where the bytes went:
//!
//! - [`Backend::Inline`] -- small payloads travel inside the ref itself
//! - [`Backend::SharedTable`] -- a process-wide concurrent map
//! - [`Backend::Workspace`] -- a caller-supplied [`Workspace`](rex_workspace::Workspace)
//!
//! # Design Rules
//!
//! 1. Every new ref carries a [`Fingerprint`](rex_types::Fingerprint) of its
//!    payload, re-verified on every fetch. A mismatch is an error, never
//!    stale data.
//! 2. Refs without a fingerprint (written before fingerprinting) fetch
//!    without verification.
//! 3. Stored keys are written once and never updated in place, which is what
//!    makes the lock-free shared table safe.
//! 4. Inline refs own their data: deleting one is a no-op and it keeps
//!    fetching.

pub mod config;
pub mod error;
pub mod reference;
pub mod store;
pub mod table;

pub use config::{ContextStoreConfig, DEFAULT_INLINE_THRESHOLD};
pub use error::{ContextError, ContextResult};
pub use reference::{Backend, ContextRef};
pub use store::{ContextStore, PutOptions};
pub use table::SharedTable;
