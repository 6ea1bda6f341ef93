use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rex",
    about = "Recursive exploration substrate: tiered context, budgets and reaping",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file, then fetch and verify it
    Stash(StashArgs),
    /// Print the progress summary of an exploration document
    Summary(SummaryArgs),
    /// Simulate concurrent child reservations against a cap
    Budget(BudgetArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct StashArgs {
    pub file: PathBuf,
    /// Override the inline threshold in bytes
    #[arg(long)]
    pub inline_threshold: Option<usize>,
    /// Promote into a workspace instead of the shared table
    #[arg(long)]
    pub workspace: bool,
}

#[derive(Args)]
pub struct SummaryArgs {
    /// Exploration document as JSON
    pub document: PathBuf,
    #[arg(long, default_value_t = 2000)]
    pub max_chars: usize,
}

#[derive(Args)]
pub struct BudgetArgs {
    #[arg(long)]
    pub max_children: Option<u64>,
    /// Concurrent callers, each reserving one child
    #[arg(long, default_value_t = 10)]
    pub callers: u64,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration file to show; defaults to --config or built-in defaults
    #[arg(long)]
    pub file: Option<PathBuf>,
}
