/// Errors from budget operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// Committing the tokens would exceed the cap. Nothing was recorded.
    #[error("token budget exceeded: {used} used + {requested} requested > {max} max")]
    BudgetExceeded { requested: u64, used: u64, max: u64 },

    /// The store's worker has been stopped.
    #[error("budget store for {owner} has been destroyed")]
    Destroyed { owner: String },
}

/// Result alias for budget operations.
pub type BudgetResult<T> = Result<T, BudgetError>;
