//! Release gate tests - readiness, single-check flips and release decisions

mod common;

use brt::core::release::{self, GateCheck};
use brt::core::workflow::{ErrorKind, WorkflowEngine, WorkflowError};
use brt::core::EntityId;
use brt::entities::batch::{
    BatchPlan, BatchStatus, BmrStatus, HoldKind, QaReleaseStatus, QcDependence, StageStatus,
};
use brt::entities::deviation::DeviationStatus;
use common::*;

/// Release must succeed exactly when evaluation says ready
fn assert_release_agrees(engine: &WorkflowEngine, id: &EntityId) {
    let decision = engine.evaluate(id).unwrap();
    let result = engine.release(&qa_head(), id);
    if decision.ready {
        let batch = result.unwrap().aggregate;
        assert_eq!(batch.qa_release_status, QaReleaseStatus::Released);
    } else {
        match result.unwrap_err() {
            WorkflowError::GateNotSatisfied { failing, .. } => {
                assert_eq!(failing, decision.failing);
            }
            other => panic!("expected GateNotSatisfied, got {other:?}"),
        }
        assert_ne!(
            engine.batch(id).unwrap().qa_release_status,
            QaReleaseStatus::Released
        );
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_fully_prepared_batch_is_released() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");

    let batch = engine.batch(&id).unwrap();
    assert_eq!(batch.stages.len(), 4);
    assert_eq!(batch.bmr.len(), 5);
    assert_eq!(batch.status, BatchStatus::Completed);

    let decision = engine.evaluate(&id).unwrap();
    assert!(decision.ready);
    assert!(decision.failing.is_empty());
    assert_eq!(decision.passed.len(), GateCheck::all().len());

    let outcome = engine.release(&qa_head(), &id).unwrap();
    assert_eq!(outcome.aggregate.qa_release_status, QaReleaseStatus::Released);
    assert_eq!(outcome.audit.action, "release");
    assert_eq!(outcome.audit.actor, "qa-head-1");
}

#[test]
fn test_open_deviation_blocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let dev = open_deviation(&engine, "AP-PARA-001", "Label reconciliation mismatch");

    let decision = engine.evaluate(&id).unwrap();
    assert!(!decision.ready);
    assert_eq!(decision.failing.len(), 1);
    assert_eq!(decision.failing[0].check, GateCheck::DeviationsResolved);
    assert!(decision.failing[0].items[0].contains(&dev.to_string()));

    let err = engine.release(&qa_head(), &id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GateNotSatisfied);
    assert_eq!(err.failing_checks().len(), 1);
    assert_eq!(
        engine.batch(&id).unwrap().qa_release_status,
        QaReleaseStatus::Pending
    );
}

#[test]
fn test_resolved_deviation_unblocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let closed = open_deviation(&engine, "AP-PARA-001", "Spill in dispensing booth");
    let rejected = open_deviation(&engine, "AP-PARA-001", "Duplicate report");
    assert!(!engine.evaluate(&id).unwrap().ready);

    drive_to(&engine, &closed, DeviationStatus::Closed);
    assert!(!engine.evaluate(&id).unwrap().ready);
    drive_to(&engine, &rejected, DeviationStatus::Rejected);
    assert!(engine.evaluate(&id).unwrap().ready);
    assert!(engine.release(&qa_head(), &id).is_ok());
}

#[test]
fn test_deviation_on_other_batch_is_ignored() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    plan(&engine, "AP-IBU-001");
    open_deviation(&engine, "AP-IBU-001", "Reactor temperature excursion");
    assert!(engine.evaluate(&id).unwrap().ready);
}

// ============================================================================
// Each condition is necessary
// ============================================================================

#[test]
fn test_flipping_bmr_blocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    engine
        .update_bmr_step(
            &qa_head(),
            &id,
            "step 3: filtration",
            BmrStatus::Clarification,
            Some("Filter integrity printout missing".to_string()),
        )
        .unwrap();

    let decision = engine.evaluate(&id).unwrap();
    assert_eq!(decision.failing.len(), 1);
    assert!(decision.is_failing(GateCheck::BmrComplete));
    assert_release_agrees(&engine, &id);
}

#[test]
fn test_flipping_deviations_blocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let dev = open_deviation(&engine, "AP-PARA-001", "Gasket found worn");
    drive_to(&engine, &dev, DeviationStatus::PendingFinalApproval);

    let decision = engine.evaluate(&id).unwrap();
    assert_eq!(decision.failing.len(), 1);
    assert!(decision.is_failing(GateCheck::DeviationsResolved));
    assert_release_agrees(&engine, &id);
}

#[test]
fn test_flipping_qc_blocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::FailedQc)
        .unwrap();

    let decision = engine.evaluate(&id).unwrap();
    assert_eq!(decision.failing.len(), 1);
    assert!(decision.is_failing(GateCheck::QcPassed));
    assert_release_agrees(&engine, &id);
}

#[test]
fn test_flipping_stages_blocks_release() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let mut batch = engine.batch(&id).unwrap();
    batch.stages[3].status = StageStatus::Running;

    let decision = release::evaluate(&batch, &[]);
    assert!(!decision.ready);
    assert_eq!(decision.failing.len(), 1);
    assert!(decision.is_failing(GateCheck::StagesCompleted));
    assert_eq!(decision.failing[0].items, vec!["Drying (running)"]);
}

#[test]
fn test_qc_cannot_pass_before_last_stage() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len() - 1);
    verify_bmr(&engine, &id);

    let err = engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let decision = engine.evaluate(&id).unwrap();
    assert!(decision.is_failing(GateCheck::StagesCompleted));
    assert!(decision.is_failing(GateCheck::QcPassed));
    assert_eq!(decision.failing[1].items, vec!["Drying (not_started)"]);
    assert_release_agrees(&engine, &id);
}

#[test]
fn test_release_and_evaluate_agree_through_lifecycle() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    assert_release_agrees(&engine, &id);
    complete_stages(&engine, &id, STAGES.len());
    assert_release_agrees(&engine, &id);
    engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc)
        .unwrap();
    assert_release_agrees(&engine, &id);
    verify_bmr(&engine, &id);
    assert_release_agrees(&engine, &id);
    assert_eq!(
        engine.batch(&id).unwrap().qa_release_status,
        QaReleaseStatus::Released
    );
}

// ============================================================================
// Rejection and release-time refusals
// ============================================================================

#[test]
fn test_reject_does_not_need_the_gate() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len());
    engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::FailedQc)
        .unwrap();

    let batch = engine
        .reject(&qa_head(), &id, "Assay out of specification")
        .unwrap()
        .aggregate;
    assert_eq!(batch.qa_release_status, QaReleaseStatus::Rejected);
    assert_eq!(batch.hold_reason.as_deref(), Some("Assay out of specification"));

    let err = engine.release(&qa_head(), &id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TerminalState);
}

#[test]
fn test_completed_batch_cannot_be_held_or_blocked() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");

    let err = engine
        .place_on_hold(&qa_head(), &id, "Pending complaint review", HoldKind::Qa)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let err = engine
        .block(&qa_head(), &id, "Pending complaint review")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let batch = engine.batch(&id).unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.qa_release_status, QaReleaseStatus::Pending);
    assert_release_agrees(&engine, &id);
}

#[test]
fn test_batch_in_qc_review_stays_decidable() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len());

    let err = engine
        .place_on_hold(&qa_head(), &id, "Awaiting retest", HoldKind::Qc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.batch(&id).unwrap().status, BatchStatus::QcReview);

    let batch = engine
        .reject(&qa_head(), &id, "Retest window missed")
        .unwrap()
        .aggregate;
    assert_eq!(batch.qa_release_status, QaReleaseStatus::Rejected);
}

#[test]
fn test_batch_without_stages_never_becomes_ready() {
    let engine = engine();
    let plan = BatchPlan::simple("AP-PARA-002", "Paracetamol API", &[], &BMR);
    let err = engine.plan_batch(&planner(), plan).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert!(engine.resolve_batch("AP-PARA-002").is_err());

    let mut batch = engine.batch(&ready_batch(&engine, "AP-PARA-001")).unwrap();
    batch.stages.clear();

    let decision = release::evaluate(&batch, &[]);
    assert!(!decision.ready);
    assert!(decision.is_failing(GateCheck::StagesCompleted));
    assert_eq!(decision.failing[0].detail, "no stages planned");
}

#[test]
fn test_only_qa_head_releases_by_default() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    for actor in [planner(), qa_manager(), qc_analyst()] {
        let err = engine.release(&actor, &id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    assert!(engine.release(&qa_head(), &id).is_ok());
}

#[test]
fn test_verified_bmr_item_reopens_only_for_clarification() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let err = engine
        .update_bmr_step(&qa_head(), &id, "Step 1: Dispensing", BmrStatus::Pending, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let err = engine
        .update_bmr_step(&qa_head(), &id, "Step 9: Shipping", BmrStatus::Verified, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_release_is_audited_with_chain_intact() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    engine.release(&qa_head(), &id).unwrap();

    let trail = engine.audit_trail(Some(&id));
    let last = trail.last().unwrap();
    assert_eq!(last.from, "pending");
    assert_eq!(last.to, "released");
    assert_eq!(engine.verify_audit().unwrap(), engine.audit_trail(None).len());
}
