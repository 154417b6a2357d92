//! `brt dev` command - Deviation ledger

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{bail, Result};
use tabled::Tabled;

use crate::cli::filters::{DeviationStatusFilter, SeverityFilter};
use crate::cli::helpers::{mutate_deviation, or_dash, truncate_str, Session};
use crate::cli::output::{effective_format, print_outcome, print_structured, print_table};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::ledger::Investigation;
use crate::core::query::DeviationFilter;
use crate::core::workflow::NewDeviation;
use crate::entities::deviation::{Department, Deviation, DeviationStatus, Severity};

/// CLI-friendly severity enum
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl From<CliSeverity> for Severity {
    fn from(cli: CliSeverity) -> Self {
        match cli {
            CliSeverity::Low => Severity::Low,
            CliSeverity::Medium => Severity::Medium,
            CliSeverity::High => Severity::High,
            CliSeverity::Critical => Severity::Critical,
        }
    }
}

/// CLI-friendly department enum
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliDepartment {
    #[default]
    Production,
    QualityAssurance,
    QualityControl,
    SupplyChain,
    Warehouse,
    Administration,
}

impl From<CliDepartment> for Department {
    fn from(cli: CliDepartment) -> Self {
        match cli {
            CliDepartment::Production => Department::Production,
            CliDepartment::QualityAssurance => Department::QualityAssurance,
            CliDepartment::QualityControl => Department::QualityControl,
            CliDepartment::SupplyChain => Department::SupplyChain,
            CliDepartment::Warehouse => Department::Warehouse,
            CliDepartment::Administration => Department::Administration,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum DevCommands {
    /// List deviations with filtering
    List(ListArgs),

    /// Show a deviation's details
    Show(DevRef),

    /// Raise a deviation against a batch
    Open(OpenArgs),

    /// Assign an investigator and start the investigation
    Assign(AssignArgs),

    /// Submit investigation findings for manager review
    Investigate(InvestigateArgs),

    /// Manager review: forward for final approval or send back
    Review(ReviewArgs),

    /// Final approval (closes the deviation)
    Approve(DevRef),

    /// Final rejection
    Reject(ReasonArgs),

    /// Withdraw a deviation raised in error
    Withdraw(ReasonArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by batch number
    #[arg(long, short = 'b')]
    pub batch: Option<String>,

    /// Filter by status
    #[arg(long, short = 's', default_value = "all")]
    pub status: DeviationStatusFilter,

    /// Minimum severity
    #[arg(long, default_value = "all")]
    pub severity: SeverityFilter,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct DevRef {
    /// Deviation id (or a unique prefix of it)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct OpenArgs {
    /// Batch number the deviation affects
    #[arg(long, short = 'b')]
    pub batch: String,

    /// Short title
    #[arg(long, short = 't')]
    pub title: String,

    /// What happened
    #[arg(long, short = 'd', default_value = "")]
    pub description: String,

    /// Severity
    #[arg(long, short = 'S', default_value = "medium")]
    pub severity: CliSeverity,

    /// Department that raised it
    #[arg(long, default_value = "production")]
    pub dept: CliDepartment,
}

#[derive(clap::Args, Debug)]
pub struct AssignArgs {
    /// Deviation id (or a unique prefix of it)
    pub id: String,

    /// Investigator to assign
    pub investigator: String,
}

#[derive(clap::Args, Debug)]
pub struct InvestigateArgs {
    /// Deviation id (or a unique prefix of it)
    pub id: String,

    /// Investigation summary
    #[arg(long, short = 's')]
    pub summary: String,

    /// Root cause
    #[arg(long)]
    pub root_cause: Option<String>,

    /// Corrective and preventive action
    #[arg(long)]
    pub capa: Option<String>,
}

#[derive(clap::Args, Debug)]
#[command(group(clap::ArgGroup::new("verdict").required(true).args(["approve", "rework"])))]
pub struct ReviewArgs {
    /// Deviation id (or a unique prefix of it)
    pub id: String,

    /// Forward for final approval
    #[arg(long)]
    pub approve: bool,

    /// Send back for further investigation
    #[arg(long)]
    pub rework: bool,

    /// Review comment
    #[arg(long, short = 'c')]
    pub comment: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReasonArgs {
    /// Deviation id (or a unique prefix of it)
    pub id: String,

    /// Reason
    #[arg(long, short = 'r')]
    pub reason: String,
}

/// Run a deviation subcommand
pub fn run(cmd: DevCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        DevCommands::List(args) => run_list(args, global),
        DevCommands::Show(args) => run_show(args, global),
        DevCommands::Open(args) => run_open(args, global),
        DevCommands::Assign(args) => mutate_deviation(global, &args.id, |engine, actor, id| {
            engine.assign_deviation(actor, id, &args.investigator)
        }),
        DevCommands::Investigate(args) => {
            if args.summary.trim().is_empty() {
                bail!("Investigation summary cannot be empty");
            }
            let findings = Investigation {
                summary: args.summary.clone(),
                root_cause: args.root_cause.clone(),
                capa: args.capa.clone(),
            };
            mutate_deviation(global, &args.id, |engine, actor, id| {
                engine.submit_investigation(actor, id, findings)
            })
        }
        DevCommands::Review(args) => mutate_deviation(global, &args.id, |engine, actor, id| {
            engine.manager_review(actor, id, args.approve, args.comment.as_deref())
        }),
        DevCommands::Approve(args) => mutate_deviation(global, &args.id, |engine, actor, id| {
            engine.final_approve(actor, id)
        }),
        DevCommands::Reject(args) => mutate_deviation(global, &args.id, |engine, actor, id| {
            engine.final_reject(actor, id, &args.reason)
        }),
        DevCommands::Withdraw(args) => mutate_deviation(global, &args.id, |engine, actor, id| {
            engine.withdraw_deviation(actor, id, &args.reason)
        }),
    }
}

#[derive(Tabled)]
struct DeviationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "BATCH")]
    batch: String,
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "ASSIGNED")]
    assigned: String,
}

impl From<&Deviation> for DeviationRow {
    fn from(dev: &Deviation) -> Self {
        Self {
            id: dev.id.to_string(),
            batch: dev.batch_number.clone(),
            severity: dev.severity.to_string(),
            status: dev.status.to_string(),
            title: truncate_str(&dev.title, 36),
            assigned: or_dash(dev.assigned_to.as_deref()),
        }
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let filter = DeviationFilter {
        batch_number: args.batch,
        status: args.status.status(),
        min_severity: args.severity.min_severity(),
        open_only: args.status.open_only(),
    };

    let mut deviations = session.engine.deviations(&filter);
    if let Some(limit) = args.limit {
        deviations.truncate(limit);
    }

    if args.count {
        println!("{}", deviations.len());
        return Ok(());
    }

    let format = effective_format(global.output, true);
    if print_structured(&deviations, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for dev in &deviations {
            println!("{}", dev.id);
        }
        return Ok(());
    }

    if deviations.is_empty() {
        println!("No deviations found.");
        return Ok(());
    }
    print_table(deviations.iter().map(DeviationRow::from).collect());
    println!("{} deviation(s) found.", style(deviations.len()).cyan());
    Ok(())
}

fn run_show(args: DevRef, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = session.engine.resolve_deviation(&args.id)?;
    let dev = session.engine.deviation(&id)?;

    let format = effective_format(global.output, false);
    if print_structured(&dev, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        println!("{}", dev.id);
        return Ok(());
    }

    let status = match dev.status {
        DeviationStatus::Closed => style(dev.status.to_string()).green(),
        DeviationStatus::Rejected => style(dev.status.to_string()).dim(),
        DeviationStatus::Open => style(dev.status.to_string()).red(),
        _ => style(dev.status.to_string()).yellow(),
    };
    let severity = match dev.severity {
        Severity::Critical | Severity::High => style(dev.severity.to_string()).red(),
        Severity::Medium => style(dev.severity.to_string()).yellow(),
        Severity::Low => style(dev.severity.to_string()).dim(),
    };

    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(dev.id).cyan());
    println!("{}: {}", style("Title").bold(), style(&dev.title).yellow());
    println!("{}: {}", style("Batch").bold(), dev.batch_number);
    println!("{}: {}", style("Severity").bold(), severity);
    println!("{}: {}", style("Status").bold(), status);
    println!("{}: {}", style("Department").bold(), dev.source_dept);
    println!(
        "{}: {} ({})",
        style("Opened").bold(),
        dev.opened_by,
        dev.opened.format("%Y-%m-%d %H:%M")
    );
    if let Some(who) = &dev.assigned_to {
        println!("{}: {}", style("Investigator").bold(), who);
    }
    if dev.rework_count > 0 {
        println!("{}: {}", style("Rework").bold(), dev.rework_count);
    }
    println!("{}", style("─".repeat(60)).dim());

    if !dev.description.is_empty() {
        println!();
        println!("{}", dev.description);
    }
    if let Some(summary) = &dev.investigation_summary {
        println!();
        println!("{}:", style("Investigation").bold());
        println!("  {}", summary);
        if let Some(cause) = &dev.root_cause {
            println!("  {}: {}", style("Root cause").dim(), cause);
        }
        if let Some(capa) = &dev.capa {
            println!("  {}: {}", style("CAPA").dim(), capa);
        }
    }
    if let Some(reviewer) = &dev.manager_reviewed_by {
        println!();
        println!("{}: {}", style("Manager review").bold(), reviewer);
    }
    if let Some(approver) = &dev.approved_by {
        println!("{}: {}", style("Decided by").bold(), approver);
    }
    if let Some(reason) = &dev.rejection_reason {
        println!("{}: {}", style("Reason").bold(), reason);
    }
    Ok(())
}

fn run_open(args: OpenArgs, global: &GlobalOpts) -> Result<()> {
    if args.title.trim().is_empty() {
        bail!("Deviation title cannot be empty");
    }
    let session = Session::open(global)?;
    let actor = session.actor()?;
    let outcome = session.engine.open_deviation(
        &actor,
        NewDeviation {
            batch_number: args.batch,
            title: args.title,
            description: args.description,
            severity: args.severity.into(),
            source_dept: args.dept.into(),
        },
    )?;
    session.save()?;
    let label = outcome.aggregate.id.to_string();
    print_outcome(&outcome, global.output, &label)
}
