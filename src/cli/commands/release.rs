//! `brt release` command - QA release gate

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{confirm, mutate_batch, Session};
use crate::cli::output::{effective_format, print_structured};
use crate::cli::GlobalOpts;
use crate::core::release::GateCheck;

#[derive(Subcommand, Debug)]
pub enum ReleaseCommands {
    /// Evaluate the release gate without changing anything
    Eval(EvalArgs),

    /// Release the batch (all gate checks must pass)
    Approve(BatchRef),

    /// Reject the batch
    Reject(RejectArgs),
}

#[derive(clap::Args, Debug)]
pub struct BatchRef {
    /// Batch number or BAT- id
    pub batch: String,
}

#[derive(clap::Args, Debug)]
pub struct EvalArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Exit with an error when the batch is not ready
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug)]
pub struct RejectArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Rejection reason (required)
    #[arg(long, short = 'r')]
    pub reason: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run a release subcommand
pub fn run(cmd: ReleaseCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ReleaseCommands::Eval(args) => run_eval(args, global),
        ReleaseCommands::Approve(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.release(actor, id)
        }),
        ReleaseCommands::Reject(args) => {
            let prompt = format!("Reject batch {}? This cannot be undone", args.batch);
            if !confirm(&prompt, args.yes)? {
                println!("Aborted.");
                return Ok(());
            }
            mutate_batch(global, &args.batch, |engine, actor, id| {
                engine.reject(actor, id, &args.reason)
            })
        }
    }
}

fn run_eval(args: EvalArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = session.engine.resolve_batch(&args.batch)?;
    let decision = session.engine.evaluate(&id)?;

    let format = effective_format(global.output, false);
    if !print_structured(&decision, format)? {
        println!(
            "{}: {}",
            style("Batch").bold(),
            style(&decision.batch_number).cyan()
        );
        for check in GateCheck::all() {
            match decision.failing.iter().find(|f| f.check == *check) {
                None => println!("  {} {}", style("✓").green(), check),
                Some(failed) => {
                    println!("  {} {}: {}", style("✗").red(), check, failed.detail);
                    for item in &failed.items {
                        println!("      {}", style(item).dim());
                    }
                }
            }
        }
        if decision.ready {
            println!("{}", style("Ready for release").green().bold());
        } else {
            println!(
                "{} ({} check(s) failing)",
                style("Not ready for release").red().bold(),
                decision.failing.len()
            );
        }
    }

    if args.strict && !decision.ready {
        return Err(miette::miette!(
            "Batch {} is not ready for release",
            decision.batch_number
        ));
    }
    Ok(())
}
