use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain tag prepended to every payload before hashing.
const DOMAIN: &str = "rex-context-v1";

/// Hex digits shown by `Debug`.
const DEBUG_HEX_LEN: usize = 12;

/// Content fingerprint attached to stored payloads at write time.
///
/// The BLAKE3 hash of the payload bytes, domain-separated so it never
/// collides with a hash taken elsewhere for another purpose. Fetch paths
/// recompute it and compare before handing data back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        f.debug_tuple("Fingerprint")
            .field(&format_args!("{}..", &hex[..DEBUG_HEX_LEN]))
            .finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
