//! `brt status` command - Plant dashboard

use console::style;
use miette::Result;

use crate::cli::helpers::Session;
use crate::cli::output::{effective_format, print_structured};
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {}

/// Print dashboard counts for the plant
pub fn run(_args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let dash = session.engine.dashboard();

    let format = effective_format(global.output, false);
    if print_structured(&dash, format)? {
        return Ok(());
    }

    println!("{}", style("Plant status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("{:<24} {}", "Batches", style(dash.total_batches).cyan());
    for (status, count) in &dash.batches_by_status {
        println!("  {:<22} {}", status, count);
    }
    println!("{:<24} {}", "Pending release", style(dash.pending_release).yellow());
    println!("{:<24} {}", "Released", style(dash.released).green());
    println!("{:<24} {}", "Rejected", style(dash.rejected).red());
    println!("{:<24} {}", "Open QA holds", style(dash.open_qa_holds).red());
    println!("{}", style("─".repeat(40)).dim());
    println!("{:<24} {}", "Open deviations", style(dash.open_deviations).cyan());
    for (severity, count) in &dash.open_deviations_by_severity {
        println!("  {:<22} {}", severity, count);
    }
    Ok(())
}
