//! Foundation types for the recursive exploration substrate (REX).
//!
//! Every other REX crate depends on `rex-types`. The types here carry no
//! behaviour beyond naming and hashing, so they can be shared freely by
//! value between the workspace, content store, budget and reaper crates.
//!
//! # Key Types
//!
//! - [`OwnerId`] -- names the request or exploration that owns a resource
//! - [`Fingerprint`] -- domain-separated BLAKE3 digest of a payload

pub mod fingerprint;
pub mod owner;

pub use fingerprint::Fingerprint;
pub use owner::OwnerId;
