use bytes::Bytes;
use serde_json::Value;

/// A value held in a [`Workspace`](crate::Workspace) table.
///
/// Exploration state is JSON; promoted context payloads are raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Json(Value),
    Blob(Bytes),
}

impl Entry {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Json(_) => "json",
            Entry::Blob(_) => "blob",
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Entry::Json(v) => Some(v),
            Entry::Blob(_) => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            Entry::Blob(b) => Some(b),
            Entry::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Entry::Json(v) => Some(v),
            Entry::Blob(_) => None,
        }
    }

    pub fn into_blob(self) -> Option<Bytes> {
        match self {
            Entry::Blob(b) => Some(b),
            Entry::Json(_) => None,
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Json(value)
    }
}

impl From<Bytes> for Entry {
    fn from(bytes: Bytes) -> Self {
        Entry::Blob(bytes)
    }
}

impl From<Vec<u8>> for Entry {
    fn from(bytes: Vec<u8>) -> Self {
        Entry::Blob(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_match_variant() {
        let json = Entry::from(json!({"a": 1}));
        assert_eq!(json.kind(), "json");
        assert!(json.as_blob().is_none());
        assert_eq!(json.as_json().unwrap()["a"], 1);

        let blob = Entry::from(b"raw".to_vec());
        assert_eq!(blob.kind(), "blob");
        assert!(blob.as_json().is_none());
        assert_eq!(blob.into_blob().unwrap().as_ref(), b"raw");
    }
}
