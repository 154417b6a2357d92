//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use tempfile::TempDir;

use brt::core::identity::EntityId;
use brt::core::ledger::Investigation;
use brt::core::team::{Actor, Policy, Role};
use brt::core::workflow::{NewDeviation, WorkflowEngine};
use brt::entities::batch::{BatchPlan, BmrStatus, QcDependence};
use brt::entities::deviation::{Department, DeviationStatus, Severity};

pub const STAGES: [&str; 4] = ["Dispensing", "Reaction", "Filtration", "Drying"];
pub const BMR: [&str; 5] = [
    "Step 1: Dispensing",
    "Step 2: Reaction",
    "Step 3: Filtration",
    "Step 4: Drying",
    "Step 5: Packaging",
];

// ============================================================================
// CLI helpers
// ============================================================================

/// Helper to get a brt command
pub fn brt() -> Command {
    Command::new(cargo::cargo_bin!("brt"))
}

/// brt running inside `tmp`, isolated from the caller's environment
pub fn brt_in(tmp: &TempDir) -> Command {
    let mut cmd = brt();
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".xdg"))
        .env_remove("BRT_STATE")
        .env_remove("BRT_ACTOR")
        .env_remove("BRT_ROLE")
        .env_remove("BRT_LOG");
    cmd
}

/// brt acting as `actor` with `role`
pub fn brt_as(tmp: &TempDir, actor: &str, role: &str) -> Command {
    let mut cmd = brt_in(tmp);
    cmd.env("BRT_ACTOR", actor).env("BRT_ROLE", role);
    cmd
}

/// Helper to create an empty plant in a temp directory
pub fn setup_plant() -> TempDir {
    let tmp = TempDir::new().unwrap();
    brt_in(&tmp).arg("init").assert().success();
    tmp
}

/// Helper to create the demo plant in a temp directory
pub fn setup_demo_plant() -> TempDir {
    let tmp = TempDir::new().unwrap();
    brt_in(&tmp).args(["init", "--demo"]).assert().success();
    tmp
}

/// Plan a batch with the standard route through the CLI
pub fn cli_plan_batch(tmp: &TempDir, number: &str) {
    let mut args = vec![
        "batch",
        "new",
        "--number",
        number,
        "--product",
        "Paracetamol API",
        "--quantity",
        "500",
    ];
    for stage in STAGES {
        args.extend(["--stage", stage]);
    }
    for item in BMR {
        args.extend(["--bmr", item]);
    }
    brt_as(tmp, "prod-man-1", "production_manager")
        .args(args)
        .assert()
        .success();
}

/// Open a deviation through the CLI and return its id
pub fn cli_open_deviation(tmp: &TempDir, batch: &str, title: &str) -> String {
    let output = brt_as(tmp, "qa-op-1", "qa_operator")
        .args(["dev", "open", "--batch", batch, "--title", title, "-o", "id"])
        .output()
        .unwrap();
    assert!(output.status.success(), "dev open failed: {:?}", output);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

// ============================================================================
// Library helpers
// ============================================================================

pub fn engine() -> WorkflowEngine {
    WorkflowEngine::new(Policy::default())
}

pub fn planner() -> Actor {
    Actor::new("prod-man-1", Role::ProductionManager)
}

pub fn operator() -> Actor {
    Actor::new("prod-op-1", Role::ProductionOperator)
}

pub fn qc_analyst() -> Actor {
    Actor::new("qc-op-1", Role::QcOperator)
}

pub fn qa_officer() -> Actor {
    Actor::new("qa-op-1", Role::QaOperator)
}

pub fn qa_manager() -> Actor {
    Actor::new("qa-man-1", Role::QaManager)
}

pub fn qa_head() -> Actor {
    Actor::new("qa-head-1", Role::QaHead)
}

/// Plan a batch on the standard four-stage route with five BMR items
pub fn plan(engine: &WorkflowEngine, number: &str) -> EntityId {
    let plan = BatchPlan::simple(number, "Paracetamol API", &STAGES, &BMR);
    engine.plan_batch(&planner(), plan).unwrap().aggregate.id
}

/// Complete the first `count` stages
pub fn complete_stages(engine: &WorkflowEngine, id: &EntityId, count: usize) {
    for stage in STAGES.iter().take(count) {
        engine.start_stage(&operator(), id, stage, None).unwrap();
        engine.advance_stage(&operator(), id, stage).unwrap();
    }
}

pub fn verify_bmr(engine: &WorkflowEngine, id: &EntityId) {
    for item in BMR {
        engine
            .update_bmr_step(&qa_officer(), id, item, BmrStatus::Verified, None)
            .unwrap();
    }
}

/// A batch meeting every release condition
pub fn ready_batch(engine: &WorkflowEngine, number: &str) -> EntityId {
    let id = plan(engine, number);
    complete_stages(engine, &id, STAGES.len());
    engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc)
        .unwrap();
    verify_bmr(engine, &id);
    id
}

pub fn open_deviation(engine: &WorkflowEngine, batch_number: &str, title: &str) -> EntityId {
    engine
        .open_deviation(
            &qa_officer(),
            NewDeviation {
                batch_number: batch_number.to_string(),
                title: title.to_string(),
                description: String::new(),
                severity: Severity::Medium,
                source_dept: Department::Production,
            },
        )
        .unwrap()
        .aggregate
        .id
}

pub fn findings() -> Investigation {
    Investigation {
        summary: "Gasket wear on reactor R-2".to_string(),
        root_cause: Some("Overdue preventive maintenance".to_string()),
        capa: Some("Replace gasket and shorten PM interval".to_string()),
    }
}

/// Drive a fresh deviation forward until it reaches `target`
pub fn drive_to(engine: &WorkflowEngine, id: &EntityId, target: DeviationStatus) {
    if target == DeviationStatus::Open {
        return;
    }
    engine.assign_deviation(&qa_manager(), id, "qa-op-1").unwrap();
    if target == DeviationStatus::Investigation {
        return;
    }
    engine
        .submit_investigation(&qa_officer(), id, findings())
        .unwrap();
    if target == DeviationStatus::PendingManagerReview {
        return;
    }
    engine.manager_review(&qa_manager(), id, true, None).unwrap();
    match target {
        DeviationStatus::Closed => {
            engine.final_approve(&qa_head(), id).unwrap();
        }
        DeviationStatus::Rejected => {
            engine.final_reject(&qa_head(), id, "Not a deviation").unwrap();
        }
        _ => {}
    }
}
