//! Top-level argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    audit::AuditCommands, batch::BatchCommands, bmr::BmrCommands, completions::CompletionsArgs,
    dev::DevCommands, init::InitArgs, release::ReleaseCommands, status::StatusArgs,
};
use crate::core::team::Role;

/// BRT - Batch Release Toolkit
///
/// Tracks manufacturing batches through their stages, runs deviations
/// through investigation and approval, and gates QA release.
#[derive(Parser, Debug)]
#[command(name = "brt", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Plant state file (defaults to .brt/plant.yaml in the plant root)
    #[arg(long, global = true, env = "BRT_STATE")]
    pub state: Option<PathBuf>,

    /// Actor id recorded in the audit trail
    #[arg(long, global = true, env = "BRT_ACTOR")]
    pub actor: Option<String>,

    /// Role claimed by the actor
    #[arg(long, global = true, env = "BRT_ROLE")]
    pub role: Option<Role>,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "auto")]
    pub output: OutputFormat,

    /// Log engine activity to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Table for lists, human-readable detail otherwise
    #[default]
    Auto,
    Yaml,
    Json,
    /// Bordered table
    Table,
    /// Entity ids only
    Id,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a plant directory with an empty (or demo) state file
    Init(InitArgs),

    /// Batch planning and shop-floor execution
    #[command(subcommand)]
    Batch(BatchCommands),

    /// Deviation ledger
    #[command(subcommand)]
    Dev(DevCommands),

    /// Batch manufacturing record checklist
    #[command(subcommand)]
    Bmr(BmrCommands),

    /// QA release gate
    #[command(subcommand)]
    Release(ReleaseCommands),

    /// Audit trail inspection and verification
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Plant dashboard counts
    Status(StatusArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
