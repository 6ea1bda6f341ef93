use rex_types::Fingerprint;
use rex_workspace::WorkspaceError;

/// Errors from context store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Nothing is stored under the ref's key (e.g. it was deleted).
    #[error("context not found: {key}")]
    NotFound { key: String },

    /// The stored bytes no longer hash to the ref's fingerprint.
    #[error("fingerprint mismatch for {key}: expected {expected}, computed {computed}")]
    FingerprintMismatch {
        key: String,
        expected: Fingerprint,
        computed: Fingerprint,
    },

    /// The backing workspace failed, typically because it was destroyed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl ContextError {
    /// `true` when the data is simply gone: deleted, or its workspace
    /// destroyed.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContextError::NotFound { .. }
                | ContextError::Workspace(WorkspaceError::Destroyed { .. })
        )
    }
}

/// Result alias for context store operations.
pub type ContextResult<T> = Result<T, ContextError>;
