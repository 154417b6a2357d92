//! Batch state machine tests through the workflow engine

mod common;

use brt::core::workflow::{ErrorKind, WorkflowEngine, WorkflowError};
use brt::core::{EntityId, Policy, StepUpdate};
use brt::entities::batch::{
    BatchPlan, BatchStatus, ESignature, HoldKind, QaReleaseStatus, QcDependence, StagePlan,
    StageStatus, StepKind, StepPlan, StepStatus,
};
use common::*;
use std::thread;

// ============================================================================
// Stage progression
// ============================================================================

#[test]
fn test_stages_run_in_order() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");

    let err = engine
        .start_stage(&operator(), &id, "Reaction", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let outcome = engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .unwrap();
    assert_eq!(outcome.aggregate.status, BatchStatus::InProgress);
    assert_eq!(outcome.aggregate.stages[0].officer.as_deref(), Some("prod-op-1"));
    assert!(outcome.aggregate.start_date.is_some());
}

#[test]
fn test_advance_completed_stage_is_already_closed() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, 1);
    let before = engine.batch(&id).unwrap();

    let err = engine
        .advance_stage(&operator(), &id, "Dispensing")
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StageAlreadyClosed { .. }));

    let after = engine.batch(&id).unwrap();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.stages[0].status, StageStatus::Completed);
}

#[test]
fn test_completed_stage_never_reopens() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, 1);

    assert!(engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .is_err());
    assert!(engine
        .update_stage_progress(&operator(), &id, "Dispensing", 50)
        .is_err());
    assert_eq!(
        engine.batch(&id).unwrap().stages[0].status,
        StageStatus::Completed
    );
}

#[test]
fn test_last_stage_moves_batch_to_qc_review() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len());

    let batch = engine.batch(&id).unwrap();
    assert_eq!(batch.status, BatchStatus::QcReview);
    assert_eq!(batch.qc_dependence, QcDependence::PendingQc);

    let batch = engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc)
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(batch.end_date.is_some());
}

#[test]
fn test_completed_status_implies_every_stage_completed() {
    let engine = engine();
    for (i, count) in [0, 1, 3, 4].into_iter().enumerate() {
        let id = plan(&engine, &format!("AP-PARA-00{}", i));
        complete_stages(&engine, &id, count);
        let result = engine.record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc);
        assert_eq!(result.is_ok(), count == STAGES.len());

        let batch = engine.batch(&id).unwrap();
        if batch.status == BatchStatus::Completed {
            assert!(batch
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Completed));
        }
        assert_eq!(batch.status == BatchStatus::Completed, count == STAGES.len());
    }
}

#[test]
fn test_qc_outcome_waits_for_qc_review() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len() - 1);

    for outcome in [QcDependence::PassedQc, QcDependence::FailedQc] {
        let err = engine
            .record_qc_outcome(&qc_analyst(), &id, outcome)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }
    let batch = engine.batch(&id).unwrap();
    assert_eq!(batch.qc_dependence, QcDependence::NotApplicable);
    assert_eq!(batch.status, BatchStatus::InProgress);

    complete_stages_from(&engine, &id, STAGES.len() - 1);
    assert_eq!(engine.batch(&id).unwrap().status, BatchStatus::QcReview);
    let batch = engine
        .record_qc_outcome(&qc_analyst(), &id, QcDependence::PassedQc)
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[test]
fn test_plan_must_start_before_qc() {
    let engine = engine();
    for qc in [QcDependence::PassedQc, QcDependence::FailedQc] {
        let mut plan = BatchPlan::simple("AP-PARA-001", "Paracetamol API", &STAGES, &BMR);
        plan.qc_dependence = qc;
        let err = engine.plan_batch(&planner(), plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }
    assert!(engine.resolve_batch("AP-PARA-001").is_err());

    let mut plan = BatchPlan::simple("AP-PARA-001", "Paracetamol API", &STAGES, &BMR);
    plan.qc_dependence = QcDependence::PendingQc;
    let id = engine.plan_batch(&planner(), plan).unwrap().aggregate.id;
    complete_stages(&engine, &id, STAGES.len());
    assert_eq!(engine.batch(&id).unwrap().status, BatchStatus::QcReview);
}

#[test]
fn test_plan_needs_distinct_stages() {
    let engine = engine();
    let empty = BatchPlan::simple("AP-PARA-001", "Paracetamol API", &[], &BMR);
    let err = engine.plan_batch(&planner(), empty).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let repeated = BatchPlan::simple(
        "AP-PARA-001",
        "Paracetamol API",
        &["Dispensing", "dispensing"],
        &BMR,
    );
    let err = engine.plan_batch(&planner(), repeated).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert!(engine.audit_trail(None).is_empty());
}

#[test]
fn test_progress_is_monotonic() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .unwrap();
    engine
        .update_stage_progress(&operator(), &id, "Dispensing", 40)
        .unwrap();
    let err = engine
        .update_stage_progress(&operator(), &id, "Dispensing", 20)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.batch(&id).unwrap().stages[0].progress, 40);
}

// ============================================================================
// SOP steps and e-signatures
// ============================================================================

fn signed_route_plan() -> BatchPlan {
    let mut plan = BatchPlan::simple("AP-IBU-001", "Ibuprofen API", &[], &[]);
    plan.stages = vec![StagePlan {
        name: "Dispensing".to_string(),
        officer: None,
        steps: vec![
            StepPlan {
                id: "step-1".to_string(),
                name: "Line clearance".to_string(),
                kind: StepKind::Confirmation,
                instructions: String::new(),
                requires_esig: false,
            },
            StepPlan {
                id: "step-2".to_string(),
                name: "Weigh API".to_string(),
                kind: StepKind::DataEntry,
                instructions: String::new(),
                requires_esig: true,
            },
        ],
    }];
    plan
}

#[test]
fn test_signature_gated_step_needs_signature() {
    let engine = engine();
    let id = engine
        .plan_batch(&planner(), signed_route_plan())
        .unwrap()
        .aggregate
        .id;

    let err = engine
        .record_step_progress(
            &operator(),
            &id,
            "Dispensing",
            "step-2",
            StepUpdate::new(StepStatus::Completed).with_value("25.02 kg"),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ESignatureRequired { .. }));

    let signed = StepUpdate::new(StepStatus::Completed)
        .with_value("25.02 kg")
        .signed(ESignature::new("prod-op-1", "performed"));
    let batch = engine
        .record_step_progress(&operator(), &id, "Dispensing", "step-2", signed)
        .unwrap()
        .aggregate;
    let step = batch.stages[0].step("step-2").unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.value.as_deref(), Some("25.02 kg"));
    assert!(step.signature.is_some());
    assert_eq!(batch.stages[0].status, StageStatus::Running);
}

#[test]
fn test_advance_waits_for_unresolved_steps() {
    let engine = engine();
    let id = engine
        .plan_batch(&planner(), signed_route_plan())
        .unwrap()
        .aggregate
        .id;
    engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .unwrap();

    let err = engine
        .advance_stage(&operator(), &id, "Dispensing")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    engine
        .record_step_progress(
            &operator(),
            &id,
            "Dispensing",
            "step-1",
            StepUpdate::new(StepStatus::Completed),
        )
        .unwrap();
    engine
        .record_step_progress(
            &operator(),
            &id,
            "Dispensing",
            "step-2",
            StepUpdate::new(StepStatus::Completed)
                .signed(ESignature::new("prod-op-1", "performed")),
        )
        .unwrap();
    assert!(engine.advance_stage(&operator(), &id, "Dispensing").is_ok());
}

#[test]
fn test_unknown_stage_and_step_are_not_found() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    let err = engine
        .start_stage(&operator(), &id, "Granulation", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine
        .record_step_progress(
            &operator(),
            &id,
            "Dispensing",
            "step-9",
            StepUpdate::new(StepStatus::InProgress),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Side branches: hold, delay, block
// ============================================================================

#[test]
fn test_hold_freezes_stage_work_until_released() {
    let engine = engine();
    let id = plan(&engine, "AP-MET-001");
    engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .unwrap();

    let batch = engine
        .place_on_hold(&qa_head(), &id, "Suspected contamination", HoldKind::Qa)
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::OnHold);
    assert_eq!(batch.qa_release_status, QaReleaseStatus::Hold);
    assert_eq!(batch.stages[0].status, StageStatus::QaHold);

    let err = engine
        .advance_stage(&operator(), &id, "Dispensing")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let batch = engine.release_hold(&qa_head(), &id).unwrap().aggregate;
    assert_eq!(batch.status, BatchStatus::InProgress);
    assert_eq!(batch.qa_release_status, QaReleaseStatus::Pending);
    assert_eq!(batch.stages[0].status, StageStatus::Running);
    assert!(engine.advance_stage(&operator(), &id, "Dispensing").is_ok());
}

#[test]
fn test_delay_and_block_round_trip() {
    let engine = engine();
    let id = plan(&engine, "AP-MET-001");
    engine
        .start_stage(&operator(), &id, "Dispensing", None)
        .unwrap();

    let batch = engine
        .mark_delayed(&planner(), &id, "Raw material late")
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::Delayed);
    let batch = engine.clear_delay(&planner(), &id).unwrap().aggregate;
    assert_eq!(batch.status, BatchStatus::InProgress);

    let batch = engine
        .block(&qa_head(), &id, "Equipment not qualified")
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::Blocked);
    assert!(engine
        .start_stage(&operator(), &id, "Reaction", None)
        .is_err());
    let batch = engine.unblock(&qa_head(), &id).unwrap().aggregate;
    assert_eq!(batch.status, BatchStatus::InProgress);
}

#[test]
fn test_delay_requires_running_batch() {
    let engine = engine();
    let id = plan(&engine, "AP-MET-001");
    let err = engine
        .mark_delayed(&planner(), &id, "Waiting on QA")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn test_block_refused_once_completed() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    let err = engine
        .block(&qa_head(), &id, "Equipment not qualified")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let pending = plan(&engine, "AP-PARA-002");
    complete_stages(&engine, &pending, STAGES.len());
    let batch = engine
        .block(&qa_head(), &pending, "Equipment not qualified")
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::Blocked);
    let err = engine
        .record_qc_outcome(&qc_analyst(), &pending, QcDependence::PassedQc)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let batch = engine.unblock(&qa_head(), &pending).unwrap().aggregate;
    assert_eq!(batch.status, BatchStatus::QcReview);
}

#[test]
fn test_hold_only_while_running() {
    let engine = engine();
    let planned = plan(&engine, "AP-PARA-001");
    let reviewed = plan(&engine, "AP-PARA-002");
    complete_stages(&engine, &reviewed, STAGES.len());
    let completed = ready_batch(&engine, "AP-PARA-003");

    for id in [&planned, &reviewed, &completed] {
        let err = engine
            .place_on_hold(&qa_head(), id, "Audit", HoldKind::Qa)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(engine.batch(id).unwrap().hold.is_none());
    }

    let running = plan(&engine, "AP-PARA-004");
    complete_stages(&engine, &running, 1);
    engine
        .mark_delayed(&planner(), &running, "Raw material late")
        .unwrap();
    let batch = engine
        .place_on_hold(&qa_head(), &running, "Audit", HoldKind::Qa)
        .unwrap()
        .aggregate;
    assert_eq!(batch.status, BatchStatus::OnHold);
}

// ============================================================================
// Capability checks and terminal state
// ============================================================================

#[test]
fn test_roles_are_enforced() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, STAGES.len());

    let err = engine
        .record_qc_outcome(&operator(), &id, QcDependence::PassedQc)
        .unwrap_err();
    match err {
        WorkflowError::Unauthorized { actor, .. } => assert_eq!(actor, "prod-op-1"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        engine.batch(&id).unwrap().qc_dependence,
        QcDependence::PendingQc
    );
}

#[test]
fn test_released_batch_rejects_every_mutation() {
    let engine = engine();
    let id = ready_batch(&engine, "AP-PARA-001");
    engine.release(&qa_head(), &id).unwrap();

    let attempts = [
        engine.advance_stage(&operator(), &id, "Drying").unwrap_err(),
        engine
            .place_on_hold(&qa_head(), &id, "late finding", HoldKind::Qa)
            .unwrap_err(),
        engine.record_yield(&operator(), &id, 97.0).unwrap_err(),
        engine.reject(&qa_head(), &id, "changed mind").unwrap_err(),
    ];
    for err in attempts {
        assert_eq!(err.kind(), ErrorKind::TerminalState);
    }
}

#[test]
fn test_yield_requires_completed_stages() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, 2);
    assert!(engine.record_yield(&operator(), &id, 96.5).is_err());

    complete_stages_from(&engine, &id, 2);
    let batch = engine.record_yield(&operator(), &id, 96.5).unwrap().aggregate;
    assert_eq!(batch.final_yield, Some(96.5));
    assert!(engine.record_yield(&operator(), &id, 120.0).is_err());
}

fn complete_stages_from(engine: &WorkflowEngine, id: &EntityId, from: usize) {
    for stage in STAGES.iter().skip(from) {
        engine.start_stage(&operator(), id, stage, None).unwrap();
        engine.advance_stage(&operator(), id, stage).unwrap();
    }
}

// ============================================================================
// Per-entity serialization
// ============================================================================

#[test]
fn test_racing_advance_applies_once() {
    for round in 0..20 {
        let engine = engine();
        let id = plan(&engine, &format!("AP-RACE-{round:03}"));
        engine
            .start_stage(&operator(), &id, "Dispensing", None)
            .unwrap();

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(|| engine.advance_stage(&operator(), &id, "Dispensing")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "exactly one advance must win");
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::StageAlreadyClosed));
        assert_eq!(engine.audit_trail(Some(&id)).len(), 3);
    }
}

#[test]
fn test_racing_advance_and_hold_stay_consistent() {
    for round in 0..20 {
        let engine = engine();
        let id = plan(&engine, &format!("AP-RACE-{round:03}"));
        engine
            .start_stage(&operator(), &id, "Dispensing", None)
            .unwrap();

        thread::scope(|s| {
            s.spawn(|| engine.advance_stage(&operator(), &id, "Dispensing"));
            s.spawn(|| engine.place_on_hold(&qa_head(), &id, "Audit", HoldKind::Qa));
        });

        let batch = engine.batch(&id).unwrap();
        assert_eq!(batch.status, BatchStatus::OnHold);
        match batch.stages[0].status {
            // hold landed first, advance was refused
            StageStatus::QaHold => assert_eq!(batch.revision, 3),
            // advance landed first, then the hold
            StageStatus::Completed => assert_eq!(batch.revision, 4),
            other => panic!("inconsistent stage status {other}"),
        }
        assert_eq!(
            engine.audit_trail(Some(&id)).len() as u32,
            batch.revision
        );
        assert!(engine.verify_audit().is_ok());
    }
}

// ============================================================================
// Reloading saved state
// ============================================================================

#[test]
fn test_snapshot_with_edited_status_is_refused() {
    let engine = engine();
    let id = plan(&engine, "AP-PARA-001");
    complete_stages(&engine, &id, 2);

    let mut snapshot = engine.snapshot();
    snapshot.batches[0].status = BatchStatus::Completed;
    let err = WorkflowEngine::from_snapshot(snapshot, Policy::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(err.to_string().contains("AP-PARA-001"));

    let restored = WorkflowEngine::from_snapshot(engine.snapshot(), Policy::default()).unwrap();
    assert_eq!(restored.batch(&id).unwrap().status, BatchStatus::InProgress);
}
