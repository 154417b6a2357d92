//! `brt batch` command - Batch planning and shop-floor execution

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{bail, IntoDiagnostic, Result};
use std::fs;
use std::path::PathBuf;
use tabled::Tabled;

use crate::cli::filters::{BatchStatusFilter, ReleaseFilter};
use crate::cli::helpers::{mutate_batch, or_dash, truncate_str, Session};
use crate::cli::output::{effective_format, print_outcome, print_structured, print_table};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::manufacturing::StepUpdate;
use crate::core::query::BatchFilter;
use crate::entities::batch::{
    Batch, BatchPlan, BatchStatus, ESignature, HoldKind, QaReleaseStatus, QcDependence, StagePlan,
    StageStatus, StepStatus, Unit,
};

/// CLI-friendly unit enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliUnit {
    Kg,
    L,
}

impl From<CliUnit> for Unit {
    fn from(cli: CliUnit) -> Self {
        match cli {
            CliUnit::Kg => Unit::Kg,
            CliUnit::L => Unit::L,
        }
    }
}

/// CLI-friendly step status enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliStepStatus {
    Pending,
    InProgress,
    Completed,
    RequiresApproval,
    Rejected,
}

impl From<CliStepStatus> for StepStatus {
    fn from(cli: CliStepStatus) -> Self {
        match cli {
            CliStepStatus::Pending => StepStatus::Pending,
            CliStepStatus::InProgress => StepStatus::InProgress,
            CliStepStatus::Completed => StepStatus::Completed,
            CliStepStatus::RequiresApproval => StepStatus::RequiresApproval,
            CliStepStatus::Rejected => StepStatus::Rejected,
        }
    }
}

/// Which unit placed a hold
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliHoldKind {
    #[default]
    Qa,
    Qc,
}

impl From<CliHoldKind> for HoldKind {
    fn from(cli: CliHoldKind) -> Self {
        match cli {
            CliHoldKind::Qa => HoldKind::Qa,
            CliHoldKind::Qc => HoldKind::Qc,
        }
    }
}

/// QC test result
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QcResult {
    Pass,
    Fail,
}

impl From<QcResult> for QcDependence {
    fn from(result: QcResult) -> Self {
        match result {
            QcResult::Pass => QcDependence::PassedQc,
            QcResult::Fail => QcDependence::FailedQc,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// List batches with filtering
    List(ListArgs),

    /// Show a batch's details
    Show(ShowArgs),

    /// Plan a new batch
    New(NewArgs),

    /// Start a stage
    Start(StageArgs),

    /// Report progress on a running stage
    Progress(ProgressArgs),

    /// Record progress on an SOP step
    Step(StepArgs),

    /// Complete a stage
    Advance(StageArgs),

    /// Place the batch on QA or QC hold
    Hold(HoldArgs),

    /// Release a hold
    Unhold(BatchRef),

    /// Mark the batch as delayed
    Delay(ReasonArgs),

    /// Clear a delay
    Undelay(BatchRef),

    /// Block the batch
    Block(ReasonArgs),

    /// Clear a block
    Unblock(BatchRef),

    /// Record the QC outcome
    Qc(QcArgs),

    /// Record the final yield
    Yield(YieldArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by batch status
    #[arg(long, short = 's', default_value = "all")]
    pub status: BatchStatusFilter,

    /// Filter by QA release status
    #[arg(long, default_value = "all")]
    pub release: ReleaseFilter,

    /// Filter by product (case-insensitive substring)
    #[arg(long, short = 'p')]
    pub product: Option<String>,

    /// Filter by plant
    #[arg(long)]
    pub plant: Option<String>,

    /// Only batches awaiting a release decision
    #[arg(long)]
    pub pending_release: bool,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Batch number or BAT- id
    pub batch: String,
}

#[derive(clap::Args, Debug)]
pub struct BatchRef {
    /// Batch number or BAT- id
    pub batch: String,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Batch number (unique)
    #[arg(long, short = 'b', required_unless_present = "plan")]
    pub number: Option<String>,

    /// Product name
    #[arg(long, short = 'p', required_unless_present = "plan")]
    pub product: Option<String>,

    /// Plant the batch is made in
    #[arg(long, default_value = "main")]
    pub plant: String,

    /// Planned quantity
    #[arg(long, short = 'Q', default_value_t = 0.0)]
    pub quantity: f64,

    /// Quantity unit
    #[arg(long, default_value = "kg")]
    pub unit: CliUnit,

    /// Stage names in order (repeatable)
    #[arg(long = "stage", short = 's')]
    pub stages: Vec<String>,

    /// BMR checklist items (repeatable)
    #[arg(long = "bmr")]
    pub bmr: Vec<String>,

    /// Production officer
    #[arg(long)]
    pub officer: Option<String>,

    /// QA officer
    #[arg(long)]
    pub qa_officer: Option<String>,

    /// Read the full plan, including SOP steps, from a YAML file
    #[arg(long, conflicts_with_all = ["number", "product", "stages", "bmr"])]
    pub plan: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct StageArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Stage name
    pub stage: String,

    /// Stage officer (start only; defaults to the actor)
    #[arg(long)]
    pub officer: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ProgressArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Stage name
    pub stage: String,

    /// Percent complete (0-100)
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub percent: u8,
}

#[derive(clap::Args, Debug)]
pub struct StepArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Stage name
    pub stage: String,

    /// Step id within the stage
    pub step: String,

    /// New step status
    pub status: CliStepStatus,

    /// Recorded value (weights, readings)
    #[arg(long)]
    pub value: Option<String>,

    /// Sign the step as the current actor with this meaning
    #[arg(long, value_name = "MEANING")]
    pub sign: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct HoldArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Reason for the hold
    #[arg(long, short = 'r')]
    pub reason: String,

    /// Unit placing the hold
    #[arg(long, default_value = "qa")]
    pub kind: CliHoldKind,
}

#[derive(clap::Args, Debug)]
pub struct ReasonArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Reason
    #[arg(long, short = 'r')]
    pub reason: String,
}

#[derive(clap::Args, Debug)]
pub struct QcArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Test result
    pub result: QcResult,
}

#[derive(clap::Args, Debug)]
pub struct YieldArgs {
    /// Batch number or BAT- id
    pub batch: String,

    /// Final yield in percent (0-100)
    pub percent: f64,
}

/// Run a batch subcommand
pub fn run(cmd: BatchCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BatchCommands::List(args) => run_list(args, global),
        BatchCommands::Show(args) => run_show(args, global),
        BatchCommands::New(args) => run_new(args, global),
        BatchCommands::Start(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.start_stage(actor, id, &args.stage, args.officer.clone())
        }),
        BatchCommands::Progress(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.update_stage_progress(actor, id, &args.stage, args.percent)
        }),
        BatchCommands::Step(args) => run_step(args, global),
        BatchCommands::Advance(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.advance_stage(actor, id, &args.stage)
        }),
        BatchCommands::Hold(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.place_on_hold(actor, id, &args.reason, args.kind.into())
        }),
        BatchCommands::Unhold(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.release_hold(actor, id)
        }),
        BatchCommands::Delay(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.mark_delayed(actor, id, &args.reason)
        }),
        BatchCommands::Undelay(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.clear_delay(actor, id)
        }),
        BatchCommands::Block(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.block(actor, id, &args.reason)
        }),
        BatchCommands::Unblock(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.unblock(actor, id)
        }),
        BatchCommands::Qc(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.record_qc_outcome(actor, id, args.result.into())
        }),
        BatchCommands::Yield(args) => mutate_batch(global, &args.batch, |engine, actor, id| {
            engine.record_yield(actor, id, args.percent)
        }),
    }
}

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "BATCH")]
    number: String,
    #[tabled(rename = "PRODUCT")]
    product: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "STAGE")]
    stage: String,
    #[tabled(rename = "QC")]
    qc: String,
    #[tabled(rename = "QA")]
    qa: String,
}

impl From<&Batch> for BatchRow {
    fn from(batch: &Batch) -> Self {
        let completed = batch
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        let stage = match batch.active_stage() {
            Some(stage) => format!("{} ({}%)", stage.name, stage.progress),
            None => format!("{}/{} done", completed, batch.stages.len()),
        };
        Self {
            number: batch.batch_number.clone(),
            product: truncate_str(&batch.product, 28),
            status: batch.status.to_string(),
            stage,
            qc: batch.qc_dependence.to_string(),
            qa: batch.qa_release_status.to_string(),
        }
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let filter = BatchFilter {
        status: args.status.status(),
        release: args.release.status(),
        product: args.product,
        plant: args.plant,
        pending_release: args.pending_release,
    };

    let mut batches = session.engine.batches(&filter);
    if let Some(limit) = args.limit {
        batches.truncate(limit);
    }

    if args.count {
        println!("{}", batches.len());
        return Ok(());
    }

    let format = effective_format(global.output, true);
    if print_structured(&batches, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for batch in &batches {
            println!("{}", batch.id);
        }
        return Ok(());
    }

    if batches.is_empty() {
        println!("No batches found.");
        return Ok(());
    }
    print_table(batches.iter().map(BatchRow::from).collect());
    println!("{} batch(es) found.", style(batches.len()).cyan());
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = session.engine.resolve_batch(&args.batch)?;
    let batch = session.engine.batch(&id)?;

    let format = effective_format(global.output, false);
    if print_structured(&batch, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        println!("{}", batch.id);
        return Ok(());
    }

    println!("{}", style("─".repeat(60)).dim());
    println!(
        "{}: {}",
        style("Batch").bold(),
        style(&batch.batch_number).cyan()
    );
    println!("{}: {}", style("ID").bold(), style(batch.id).dim());
    println!("{}: {}", style("Product").bold(), style(&batch.product).yellow());
    println!("{}: {}", style("Plant").bold(), batch.plant);
    println!(
        "{}: {} {}",
        style("Quantity").bold(),
        batch.quantity,
        batch.unit
    );
    println!("{}: {}", style("Status").bold(), styled_status(batch.status));
    println!(
        "{}: {}",
        style("QA Release").bold(),
        styled_release(batch.qa_release_status)
    );
    println!("{}: {}", style("QC").bold(), batch.qc_dependence);
    if let Some(y) = batch.final_yield {
        println!("{}: {:.1}%", style("Yield").bold(), y);
    }
    if let Some(start) = batch.start_date {
        println!("{}: {}", style("Started").bold(), start);
    }
    if let Some(end) = batch.end_date {
        println!("{}: {}", style("Ended").bold(), end);
    }
    if let Some(hold) = &batch.hold {
        println!(
            "{}: {} ({} hold by {})",
            style("Hold").bold().red(),
            or_dash(batch.hold_reason.as_deref()),
            hold.kind,
            hold.placed_by
        );
    } else if batch.qa_release_status == QaReleaseStatus::Rejected {
        println!(
            "{}: {}",
            style("Rejected").bold().red(),
            or_dash(batch.hold_reason.as_deref())
        );
    }
    if let Some(reason) = &batch.delay_reason {
        println!("{}: {}", style("Delayed").bold().yellow(), reason);
    }
    if let Some(reason) = &batch.block_reason {
        println!("{}: {}", style("Blocked").bold().red(), reason);
    }
    println!("{}", style("─".repeat(60)).dim());

    if !batch.stages.is_empty() {
        println!();
        println!("{} ({}):", style("Stages").bold(), batch.stages.len());
        for (i, stage) in batch.stages.iter().enumerate() {
            let status = match stage.status {
                StageStatus::NotStarted => style(stage.status.to_string()).dim(),
                StageStatus::Running => style(stage.status.to_string()).yellow(),
                StageStatus::QaHold | StageStatus::QcHold => style(stage.status.to_string()).red(),
                StageStatus::Completed => style(stage.status.to_string()).green(),
            };
            print!("  {}. {} [{}] {}%", i + 1, stage.name, status, stage.progress);
            if let Some(officer) = &stage.officer {
                print!(" {}", style(officer).dim());
            }
            println!();
            for step in &stage.steps {
                print!("     • {} {} [{}]", step.id, step.name, step.status);
                if let Some(value) = &step.value {
                    print!(" = {}", value);
                }
                match (&step.signature, step.requires_esig) {
                    (Some(sig), _) => {
                        let signed = format!("signed {} ({})", sig.signer, sig.meaning);
                        print!(" {}", style(signed).green())
                    }
                    (None, true) => print!(" {}", style("e-sig required").yellow()),
                    (None, false) => {}
                }
                println!();
            }
        }
    }

    if !batch.bmr.is_empty() {
        println!();
        println!(
            "{} ({}/{} verified):",
            style("BMR").bold(),
            batch.bmr_verified(),
            batch.bmr.len()
        );
        for item in &batch.bmr {
            print!("  • {} [{}]", item.name, item.status);
            if let Some(note) = &item.note {
                print!(" {}", style(note).dim());
            }
            println!();
        }
    }

    let deviations = session.engine.deviations_for_batch(&batch.batch_number);
    if !deviations.is_empty() {
        println!();
        println!("{} ({}):", style("Deviations").bold(), deviations.len());
        for dev in &deviations {
            println!(
                "  • {} [{}] {} {}",
                style(dev.id).dim(),
                dev.status,
                dev.severity,
                dev.title
            );
        }
    }
    Ok(())
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let plan = match &args.plan {
        Some(path) => {
            let content = fs::read_to_string(path).into_diagnostic()?;
            serde_yml::from_str::<BatchPlan>(&content)
                .map_err(|e| miette::miette!("Invalid plan {}: {}", path.display(), e))?
        }
        None => plan_from_args(&args)?,
    };

    let session = Session::open(global)?;
    let actor = session.actor()?;
    let outcome = session.engine.plan_batch(&actor, plan)?;
    session.save()?;
    print_outcome(&outcome, global.output, &outcome.aggregate.batch_number)
}

fn plan_from_args(args: &NewArgs) -> Result<BatchPlan> {
    let (Some(number), Some(product)) = (&args.number, &args.product) else {
        bail!("--number and --product are required without --plan");
    };
    if number.trim().is_empty() {
        bail!("Batch number cannot be empty");
    }
    Ok(BatchPlan {
        batch_number: number.trim().to_string(),
        product: product.clone(),
        plant: args.plant.clone(),
        quantity: args.quantity,
        unit: args.unit.into(),
        stages: args
            .stages
            .iter()
            .map(|name| StagePlan {
                name: name.clone(),
                officer: None,
                steps: Vec::new(),
            })
            .collect(),
        bmr: args.bmr.clone(),
        qc_dependence: QcDependence::NotApplicable,
        assigned_to: None,
        officer: args.officer.clone(),
        qa_officer: args.qa_officer.clone(),
    })
}

fn run_step(args: StepArgs, global: &GlobalOpts) -> Result<()> {
    mutate_batch(global, &args.batch, |engine, actor, id| {
        let mut update = StepUpdate::new(args.status.into());
        if let Some(value) = &args.value {
            update = update.with_value(value.clone());
        }
        if let Some(meaning) = &args.sign {
            update = update.signed(ESignature::new(actor.id.clone(), meaning.clone()));
        }
        engine.record_step_progress(actor, id, &args.stage, &args.step, update)
    })
}

fn styled_status(status: BatchStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        BatchStatus::Planned => style(text).dim(),
        BatchStatus::InProgress | BatchStatus::QcReview => style(text).yellow(),
        BatchStatus::Completed => style(text).green(),
        BatchStatus::OnHold | BatchStatus::Blocked => style(text).red(),
        BatchStatus::Delayed => style(text).magenta(),
    }
}

fn styled_release(status: QaReleaseStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        QaReleaseStatus::Pending => style(text).dim(),
        QaReleaseStatus::Hold => style(text).yellow(),
        QaReleaseStatus::Released => style(text).green(),
        QaReleaseStatus::Rejected => style(text).red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> NewArgs {
        NewArgs {
            number: Some(" AP-PARA-003 ".to_string()),
            product: Some("Paracetamol API".to_string()),
            plant: "main".to_string(),
            quantity: 250.0,
            unit: CliUnit::Kg,
            stages: vec!["Dispensing".to_string(), "Reaction".to_string()],
            bmr: vec!["Line clearance".to_string()],
            officer: None,
            qa_officer: None,
            plan: None,
        }
    }

    #[test]
    fn test_plan_from_args() {
        let plan = plan_from_args(&args()).unwrap();
        assert_eq!(plan.batch_number, "AP-PARA-003");
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.bmr, vec!["Line clearance".to_string()]);
    }

    #[test]
    fn test_plan_requires_number() {
        let mut missing = args();
        missing.number = None;
        assert!(plan_from_args(&missing).is_err());
    }

    #[test]
    fn test_row_shows_stage_progress() {
        let batch = Batch::from_plan(plan_from_args(&args()).unwrap(), "pm".to_string());
        let row = BatchRow::from(&batch);
        assert_eq!(row.stage, "0/2 done");
        assert_eq!(row.status, "planned");
    }
}
