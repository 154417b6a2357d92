//! `brt init` command - Create a plant directory

use console::style;
use miette::{bail, IntoDiagnostic, Result};
use rust_embed::Embed;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::cli::GlobalOpts;
use crate::core::config::{PLANT_DIR, STATE_FILE};
use crate::core::identity::EntityId;
use crate::core::ledger::Investigation;
use crate::core::manufacturing::StepUpdate;
use crate::core::team::{Actor, Policy, Role};
use crate::core::workflow::{NewDeviation, WorkflowEngine, WorkflowError};
use crate::entities::batch::{
    BatchPlan, BmrStatus, ESignature, QcDependence, StagePlan, StepStatus, Unit,
};
use crate::entities::deviation::{Department, DeviationStatus, Severity};

#[derive(Embed)]
#[folder = "seeds/"]
struct Seeds;

const DEMO_SEED: &str = "demo-plant.yaml";

const CONFIG_TEMPLATE: &str = "\
# BRT plant configuration
#
# Defaults for the acting user; --actor/--role and BRT_ACTOR/BRT_ROLE win.
# actor: prod-man-1
# role: production_manager
#
# Log filter for engine activity (BRT_LOG overrides).
# log: info
#
# Capability overrides, e.g. let the plant head release batches too:
# policy:
#   grants:
#     release_batch: [qa_head, plant_head]
";

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Load the demo plant (five batches and two deviations)
    #[arg(long)]
    pub demo: bool,

    /// Overwrite an existing state file
    #[arg(long)]
    pub force: bool,
}

/// Run the init command
pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let plant_dir = args.path.join(PLANT_DIR);
    fs::create_dir_all(&plant_dir).into_diagnostic()?;

    let config_path = plant_dir.join("config.yaml");
    if !config_path.exists() {
        fs::write(&config_path, CONFIG_TEMPLATE).into_diagnostic()?;
    }

    let state_path = global
        .state
        .clone()
        .unwrap_or_else(|| plant_dir.join(STATE_FILE));
    if state_path.exists() && !args.force {
        bail!(
            "Plant state already exists at {}\nUse --force to overwrite it",
            state_path.display()
        );
    }

    let engine = WorkflowEngine::new(Policy::permissive());
    if args.demo {
        seed_demo(&engine)?;
    }
    engine.snapshot().save(&state_path)?;

    let dashboard = engine.dashboard();
    println!(
        "{} Initialized plant at {}",
        style("✓").green(),
        style(state_path.display()).cyan()
    );
    if args.demo {
        println!(
            "   {} batch(es), {} open deviation(s), {} pending release",
            dashboard.total_batches, dashboard.open_deviations, dashboard.pending_release
        );
    }
    println!();
    println!("Next steps:");
    println!("  export BRT_ACTOR=prod-man-1 BRT_ROLE=production_manager");
    println!("  brt batch list");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DemoSeed {
    plant: String,
    route: Vec<StagePlan>,
    #[serde(default)]
    bmr: Vec<String>,
    batches: Vec<SeedBatch>,
    #[serde(default)]
    deviations: Vec<SeedDeviation>,
}

#[derive(Debug, Deserialize)]
struct SeedBatch {
    batch_number: String,
    product: String,
    quantity: f64,
    #[serde(default)]
    unit: Unit,
    #[serde(default)]
    completed_stages: usize,
    #[serde(default)]
    qc: Option<QcDependence>,
    #[serde(default)]
    verify_bmr: bool,
}

#[derive(Debug, Deserialize)]
struct SeedDeviation {
    batch_number: String,
    title: String,
    #[serde(default)]
    description: String,
    severity: Severity,
    source_dept: Department,
    #[serde(default = "default_seed_status")]
    status: DeviationStatus,
    #[serde(default)]
    investigator: Option<String>,
}

fn default_seed_status() -> DeviationStatus {
    DeviationStatus::Open
}

fn load_seed() -> Result<DemoSeed> {
    let file = Seeds::get(DEMO_SEED)
        .ok_or_else(|| miette::miette!("Embedded seed {} is missing", DEMO_SEED))?;
    let content = std::str::from_utf8(&file.data).into_diagnostic()?;
    serde_yml::from_str(content).into_diagnostic()
}

/// Populate an engine with the demo plant, through the regular operations
fn seed_demo(engine: &WorkflowEngine) -> Result<()> {
    let seed = load_seed()?;
    let actor = Actor::new("brt-init", Role::SystemAdmin);

    for entry in &seed.batches {
        let plan = BatchPlan {
            batch_number: entry.batch_number.clone(),
            product: entry.product.clone(),
            plant: seed.plant.clone(),
            quantity: entry.quantity,
            unit: entry.unit,
            stages: seed.route.clone(),
            bmr: seed.bmr.clone(),
            qc_dependence: QcDependence::NotApplicable,
            assigned_to: None,
            officer: None,
            qa_officer: None,
        };
        let id = engine.plan_batch(&actor, plan)?.aggregate.id;
        run_stages(engine, &actor, &id, &seed.route, entry.completed_stages)?;
        if let Some(qc) = entry.qc {
            engine.record_qc_outcome(&actor, &id, qc)?;
        }
        if entry.verify_bmr {
            for item in &seed.bmr {
                engine.update_bmr_step(&actor, &id, item, BmrStatus::Verified, None)?;
            }
        }
    }

    for entry in seed.deviations {
        let target = entry.status;
        let investigator = entry
            .investigator
            .clone()
            .unwrap_or_else(|| "qa-op-1".to_string());
        let dev = engine.open_deviation(
            &actor,
            NewDeviation {
                batch_number: entry.batch_number,
                title: entry.title,
                description: entry.description,
                severity: entry.severity,
                source_dept: entry.source_dept,
            },
        )?;
        drive_deviation(engine, &actor, &dev.aggregate.id, target, &investigator)?;
    }

    info!(
        batches = engine.dashboard().total_batches,
        "demo plant seeded"
    );
    Ok(())
}

fn run_stages(
    engine: &WorkflowEngine,
    actor: &Actor,
    batch: &EntityId,
    route: &[StagePlan],
    count: usize,
) -> Result<(), WorkflowError> {
    for stage in route.iter().take(count) {
        engine.start_stage(actor, batch, &stage.name, None)?;
        for step in &stage.steps {
            let mut update = StepUpdate::new(StepStatus::Completed);
            if step.requires_esig {
                update = update.signed(ESignature::new(actor.id.clone(), "performed"));
            }
            engine.record_step_progress(actor, batch, &stage.name, &step.id, update)?;
        }
        engine.advance_stage(actor, batch, &stage.name)?;
    }
    Ok(())
}

fn drive_deviation(
    engine: &WorkflowEngine,
    actor: &Actor,
    dev: &EntityId,
    target: DeviationStatus,
    investigator: &str,
) -> Result<(), WorkflowError> {
    if target == DeviationStatus::Open {
        return Ok(());
    }
    engine.assign_deviation(actor, dev, investigator)?;
    if target == DeviationStatus::Investigation {
        return Ok(());
    }
    let findings = Investigation {
        summary: "Investigated during demo setup".to_string(),
        root_cause: Some("Operator error".to_string()),
        capa: Some("Retrain line staff".to_string()),
    };
    engine.submit_investigation(actor, dev, findings)?;
    if target == DeviationStatus::PendingManagerReview {
        return Ok(());
    }
    engine.manager_review(actor, dev, true, None)?;
    match target {
        DeviationStatus::Closed => engine.final_approve(actor, dev).map(|_| ()),
        DeviationStatus::Rejected => engine
            .final_reject(actor, dev, "Not a deviation")
            .map(|_| ()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::BatchFilter;
    use crate::entities::batch::BatchStatus;

    #[test]
    fn test_demo_seed_parses() {
        let seed = load_seed().unwrap();
        assert_eq!(seed.batches.len(), 5);
        assert_eq!(seed.route.len(), 4);
        assert!(seed.route[0].steps.iter().any(|s| s.requires_esig));
    }

    #[test]
    fn test_seed_demo_builds_consistent_plant() {
        let engine = WorkflowEngine::new(Policy::permissive());
        seed_demo(&engine).unwrap();

        let dash = engine.dashboard();
        assert_eq!(dash.total_batches, 5);
        assert_eq!(dash.open_deviations, 1);

        let para = engine.batch_by_number("AP-PARA-001").unwrap();
        assert_eq!(para.status, BatchStatus::Completed);
        assert!(engine.evaluate(&para.id).unwrap().ready);

        let ibu = engine.batch_by_number("AP-IBU-001").unwrap();
        assert!(!engine.evaluate(&ibu.id).unwrap().ready);

        let asp = engine.batch_by_number("AP-ASP-001").unwrap();
        assert_eq!(asp.status, BatchStatus::QcReview);

        let met = engine.batch_by_number("AP-MET-001").unwrap();
        assert_eq!(met.status, BatchStatus::InProgress);

        assert_eq!(engine.batches(&BatchFilter::default()).len(), 5);
        assert!(engine.verify_audit().unwrap() > 20);
    }
}
