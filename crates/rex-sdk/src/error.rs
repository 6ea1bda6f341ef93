use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("workspace error: {0}")]
    Workspace(#[from] rex_workspace::WorkspaceError),

    #[error("context error: {0}")]
    Context(#[from] rex_store::ContextError),

    #[error("budget error: {0}")]
    Budget(#[from] rex_budget::BudgetError),

    #[error("reaper error: {0}")]
    Reaper(#[from] rex_reaper::ReaperError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type SdkResult<T> = Result<T, SdkError>;
