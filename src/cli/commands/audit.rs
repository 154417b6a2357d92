//! `brt audit` command - Audit trail inspection

use clap::Subcommand;
use console::style;
use miette::Result;
use tabled::Tabled;

use crate::cli::helpers::{or_dash, truncate_str, Session};
use crate::cli::output::{effective_format, print_structured, print_table};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::audit::AuditEntry;
use crate::core::identity::EntityId;
use crate::core::workflow::WorkflowEngine;

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Show audit entries, optionally for one batch or deviation
    Show(ShowArgs),

    /// Verify the hash chain of the whole trail
    Verify,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Batch number, BAT- id or DEV- id
    pub entity: Option<String>,

    /// Only entries recorded by this actor
    #[arg(long = "by")]
    pub by: Option<String>,

    /// Show only the most recent N entries
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

/// Run an audit subcommand
pub fn run(cmd: AuditCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        AuditCommands::Show(args) => run_show(args, global),
        AuditCommands::Verify => run_verify(global),
    }
}

#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "SEQ")]
    seq: u64,
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "ENTITY")]
    entity: String,
    #[tabled(rename = "ACTOR")]
    actor: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "CHANGE")]
    change: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

impl From<&AuditEntry> for AuditRow {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            seq: entry.seq,
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            entity: entry.entity.clone(),
            actor: format!("{} ({})", entry.actor, entry.role),
            action: entry.action.clone(),
            change: format!("{} → {}", entry.from, entry.to),
            detail: truncate_str(&or_dash(entry.detail.as_deref()), 40),
        }
    }
}

fn resolve_entity(engine: &WorkflowEngine, reference: &str) -> Result<EntityId> {
    if let Ok(id) = engine.resolve_batch(reference) {
        return Ok(id);
    }
    Ok(engine.resolve_deviation(reference)?)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let entity = match &args.entity {
        Some(reference) => Some(resolve_entity(&session.engine, reference)?),
        None => None,
    };

    let mut entries = match &args.by {
        Some(by) => session.engine.audit_by_actor(by),
        None => session.engine.audit_trail(entity.as_ref()),
    };
    if let (Some(id), Some(_)) = (&entity, &args.by) {
        let key = id.to_string();
        entries.retain(|e| e.entity == key);
    }
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    let format = effective_format(global.output, true);
    if print_structured(&entries, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for entry in &entries {
            println!("{}", entry.hash);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }
    print_table(entries.iter().map(AuditRow::from).collect());
    println!("{} entr(ies).", style(entries.len()).cyan());
    Ok(())
}

fn run_verify(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let count = session.engine.verify_audit()?;
    println!(
        "{} Audit chain intact ({} entries)",
        style("✓").green(),
        style(count).cyan()
    );
    Ok(())
}
