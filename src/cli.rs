//! Command-line interface definitions.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::OutputFormat;
use crate::reconcile::IncludeSet;

/// Top-level CLI entry point for the dotfile state engine.
#[derive(Parser, Debug)]
#[command(
    name = "dotstate",
    about = "Reconcile a home directory against a source state",
    version
)]
pub struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/dotstate/dotstate.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the source directory
    #[arg(short = 'S', long, global = true)]
    pub source: Option<PathBuf>,

    /// Override the destination directory
    #[arg(short = 'D', long, global = true)]
    pub destination: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Update the destination to match the source state
    Apply(ApplyOpts),
    /// Exit non-zero if the destination differs from the source state
    Verify(SelectOpts),
    /// Print the target state without touching the destination
    Dump(DumpOpts),
    /// List destination entries that are not managed
    Unmanaged,
    /// Query credential tools
    #[command(subcommand)]
    Secret(SecretCommand),
    /// Generate shell completions
    Completion(CompletionOpts),
    /// Print version information
    Version,
}

/// Target selection shared by `apply`, `verify`, and `dump`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectOpts {
    /// Entry kinds to include (all, none, absent, dirs, files, scripts, symlinks)
    #[arg(short, long, default_value_t = IncludeSet::all())]
    pub include: IncludeSet,

    /// Include every entry below each target
    #[arg(short, long)]
    pub recursive: bool,

    /// Targets to act on, as paths in the destination (default: everything)
    pub targets: Vec<String>,
}

/// Options for the `apply` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyOpts {
    /// Preview changes without applying
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Keep going after a target fails
    #[arg(short, long)]
    pub keep_going: bool,

    /// Which targets to act on.
    #[command(flatten)]
    pub select: SelectOpts,
}

/// Options for the `dump` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct DumpOpts {
    /// Output format (default: from config, else json)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Which targets to act on.
    #[command(flatten)]
    pub select: SelectOpts,
}

/// Credential tool subcommands.
#[derive(Subcommand, Debug)]
pub enum SecretCommand {
    /// Show a KeePassXC entry
    Keepassxc(KeePassXcOpts),
}

/// Options for `secret keepassxc`.
#[derive(Args, Debug, Clone)]
pub struct KeePassXcOpts {
    /// Entry path in the database
    pub entry: String,

    /// Print only this attribute
    #[arg(short, long)]
    pub attribute: Option<String>,
}

/// Options for the `completion` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CompletionOpts {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
