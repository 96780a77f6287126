//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Labstage - staged, content-addressed experiment cache
///
/// Verifies and decompresses a corpus, tracks the signatures of every stage
/// built from it, and detects stale or half-written stages.
#[derive(Parser, Debug)]
#[command(name = "labstage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LABSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filesystem changes instead of making them
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the lock state of stage directories
    Status(StatusArgs),

    /// Print the SHA-512 signature of files
    Sign(SignArgs),

    /// Verify and extract the configured corpus archives
    Decompress,

    /// Check the signature chain of every published stage
    Verify(VerifyArgs),

    /// List the files of the decompressed corpus
    List(ListArgs),

    /// Fetch the query log and write the replay script
    Script(ScriptArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Output format for status, verify and list
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
    /// One entry per line
    Plain,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Stage directories to inspect (defaults to the configured experiment)
    pub dirs: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the sign command
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Files to sign, in accumulation order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Also re-sign sample and configuration contents (takes locks)
    #[arg(long)]
    pub deep: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the script command
#[derive(Parser, Debug)]
pub struct ScriptArgs {
    /// Sample to replay (defaults to the configuration sample)
    #[arg(short, long)]
    pub sample: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
