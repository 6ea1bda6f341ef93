/// Errors from reaper operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaperError {
    #[error("reaper {name} has been stopped")]
    Stopped { name: String },

    #[error("no reaper named {name}")]
    UnknownReaper { name: String },
}

pub type ReaperResult<T> = Result<T, ReaperError>;
