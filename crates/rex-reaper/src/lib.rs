//! TTL-driven reclamation.
//!
//! A [`Reaper`] holds at most one timer per tracked resource. When a timer
//! fires the resource's own delete operation is invoked: workspaces are
//! destroyed, promoted context is removed from its tier, inline context is
//! skipped. Finding the resource already gone is the normal outcome of a
//! caller cleaning up first and is never treated as a failure.
//!
//! Reapers are independent; a [`ReaperRegistry`] lets callers address them
//! by name.

pub mod error;
pub mod event;
pub mod reaper;
pub mod registry;
pub mod resource;

pub use error::{ReaperError, ReaperResult};
pub use event::{ReapEvent, ReapOutcome};
pub use reaper::Reaper;
pub use registry::ReaperRegistry;
pub use resource::{ResourceTag, TrackedResource};
