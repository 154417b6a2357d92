//! `brt bmr` command - Batch manufacturing record checklist

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;
use tabled::Tabled;

use crate::cli::helpers::{mutate_batch, or_dash, Session};
use crate::cli::output::{effective_format, print_structured, print_table};
use crate::cli::GlobalOpts;
use crate::entities::batch::{BmrStatus, BmrStep};

/// CLI-friendly BMR item status
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliBmrStatus {
    Missing,
    Pending,
    Clarification,
    Verified,
}

impl From<CliBmrStatus> for BmrStatus {
    fn from(cli: CliBmrStatus) -> Self {
        match cli {
            CliBmrStatus::Missing => BmrStatus::Missing,
            CliBmrStatus::Pending => BmrStatus::Pending,
            CliBmrStatus::Clarification => BmrStatus::Clarification,
            CliBmrStatus::Verified => BmrStatus::Verified,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum BmrCommands {
    /// Show a batch's BMR checklist
    Show(ShowArgs),

    /// Set the status of a BMR item
    Set(SetArgs),
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Batch number or BAT- id
    pub batch: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// BMR item name (case-insensitive)
    pub item: String,

    /// New status
    pub status: CliBmrStatus,

    /// Reviewer note, e.g. what needs clarifying
    #[arg(long)]
    pub note: Option<String>,
}

/// Run a BMR subcommand
pub fn run(cmd: BmrCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BmrCommands::Show(args) => run_show(args, global),
        BmrCommands::Set(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.update_bmr_step(actor, id, &args.item, args.status.into(), args.note.clone())
        }),
    }
}

#[derive(Tabled)]
struct BmrRow {
    #[tabled(rename = "ITEM")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "VERIFIED BY")]
    verified_by: String,
    #[tabled(rename = "NOTE")]
    note: String,
}

impl From<&BmrStep> for BmrRow {
    fn from(step: &BmrStep) -> Self {
        Self {
            name: step.name.clone(),
            status: step.status.to_string(),
            verified_by: or_dash(step.verified_by.as_deref()),
            note: or_dash(step.note.as_deref()),
        }
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = session.engine.resolve_batch(&args.batch)?;
    let batch = session.engine.batch(&id)?;

    let format = effective_format(global.output, true);
    if print_structured(&batch.bmr, format)? {
        return Ok(());
    }

    if batch.bmr.is_empty() {
        println!("Batch {} has no BMR checklist.", batch.batch_number);
        return Ok(());
    }
    print_table(batch.bmr.iter().map(BmrRow::from).collect());
    let verified = batch.bmr_verified();
    let summary = format!("{}/{} verified", verified, batch.bmr.len());
    if verified == batch.bmr.len() {
        println!("{} {}", style("✓").green(), summary);
    } else {
        println!("{} {}", style("○").yellow(), summary);
    }
    Ok(())
}
