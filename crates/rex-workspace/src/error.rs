use uuid::Uuid;

/// Errors from workspace, workspace-store and collector operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkspaceError {
    /// The workspace worker has been destroyed; its table is gone.
    #[error("workspace {id} has been destroyed")]
    Destroyed { id: Uuid },

    /// An update function panicked. The previous value is left in place.
    #[error("update of key {key:?} panicked; value left unchanged")]
    UpdatePanicked { key: String },

    /// A stored entry had a different shape than the caller expected.
    #[error("entry at {key:?} is {found}, expected {expected}")]
    UnexpectedEntry {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The exploration document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The partial collector has already been stopped.
    #[error("partial collector has been stopped")]
    CollectorStopped,
}

/// Result alias for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
