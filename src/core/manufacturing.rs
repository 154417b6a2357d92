//! Batch state machine
//!
//! Pure transition functions over a [`Batch`]. Each function validates the
//! requested change against the batch's current state, applies it in place and
//! returns the [`Transition`] to be recorded in the audit trail. Nothing here
//! takes locks or checks roles; the engine does both before calling in.
//!
//! The overall batch status is recomputed with [`Batch::refresh_status`] after
//! every change, so it always agrees with stage state and the active
//! side-branch.

use std::collections::HashSet;

use chrono::Utc;

use crate::core::audit::Transition;
use crate::core::workflow::WorkflowError;
use crate::entities::batch::{
    Batch, BatchPlan, BatchStatus, ESignature, Hold, HoldKind, QaReleaseStatus, QcDependence, StageStatus,
    StepStatus,
};

/// Requested change to a single SOP step
#[derive(Debug, Clone)]
pub struct StepUpdate {
    pub status: StepStatus,
    /// Recorded value for data-entry steps
    pub value: Option<String>,
    pub signature: Option<ESignature>,
}

impl StepUpdate {
    pub fn new(status: StepStatus) -> Self {
        Self {
            status,
            value: None,
            signature: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn signed(mut self, signature: ESignature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Fail once the release decision has been made
pub fn ensure_mutable(batch: &Batch) -> Result<(), WorkflowError> {
    if batch.is_terminal() {
        return Err(WorkflowError::TerminalState {
            entity: batch.batch_number.clone(),
            state: batch.qa_release_status.to_string(),
        });
    }
    Ok(())
}

/// Whether moving a step from `from` to `to` is a legal edge
pub fn is_valid_step_transition(from: StepStatus, to: StepStatus) -> bool {
    use StepStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Completed)
            | (InProgress, Completed)
            | (InProgress, RequiresApproval)
            | (InProgress, Rejected)
            | (RequiresApproval, Completed)
            | (RequiresApproval, Rejected)
            | (Rejected, InProgress)
    )
}

fn invalid(
    batch: &Batch,
    from: impl ToString,
    to: impl ToString,
    detail: impl Into<String>,
) -> WorkflowError {
    WorkflowError::InvalidTransition {
        entity: batch.batch_number.clone(),
        from: from.to_string(),
        to: to.to_string(),
        detail: detail.into(),
    }
}

/// Check a plan before a batch is created from it
///
/// A batch needs at least one stage, unique stage names and must start
/// either awaiting QC or with QC not yet applicable.
pub fn validate_plan(plan: &BatchPlan) -> Result<(), WorkflowError> {
    let refuse = |detail: String| WorkflowError::InvalidTransition {
        entity: plan.batch_number.clone(),
        from: "-".to_string(),
        to: BatchStatus::Planned.to_string(),
        detail,
    };
    if plan.stages.is_empty() {
        return Err(refuse("a batch needs at least one stage".to_string()));
    }
    let mut seen = HashSet::new();
    for stage in &plan.stages {
        if !seen.insert(stage.name.to_ascii_lowercase()) {
            return Err(refuse(format!("stage '{}' is planned twice", stage.name)));
        }
    }
    if !matches!(
        plan.qc_dependence,
        QcDependence::PendingQc | QcDependence::NotApplicable
    ) {
        return Err(refuse(format!(
            "a new batch cannot start with QC {}",
            plan.qc_dependence
        )));
    }
    Ok(())
}

fn find_stage(batch: &Batch, stage: &str) -> Result<usize, WorkflowError> {
    batch
        .stage_index(stage)
        .ok_or_else(|| WorkflowError::NotFound {
            kind: "stage".to_string(),
            id: format!("{}/{}", batch.batch_number, stage),
        })
}

/// Stage work is suspended while the batch is held or blocked
fn ensure_workable(batch: &Batch, to: &str) -> Result<(), WorkflowError> {
    if batch.block_reason.is_some() {
        return Err(invalid(batch, batch.status, to, "batch is blocked"));
    }
    if let Some(hold) = &batch.hold {
        return Err(invalid(
            batch,
            batch.status,
            to,
            format!("batch is on {} hold", hold.kind),
        ));
    }
    Ok(())
}

/// First stage before `idx` that is not completed
fn incomplete_predecessor(batch: &Batch, idx: usize) -> Option<&str> {
    batch.stages[..idx]
        .iter()
        .find(|s| s.status != StageStatus::Completed)
        .map(|s| s.name.as_str())
}

fn closed(batch: &Batch, idx: usize) -> WorkflowError {
    WorkflowError::StageAlreadyClosed {
        batch: batch.batch_number.clone(),
        stage: batch.stages[idx].name.clone(),
    }
}

fn start_if_first(batch: &mut Batch) {
    if batch.start_date.is_none() {
        batch.start_date = Some(Utc::now().date_naive());
    }
}

/// Stamp the end date once the batch has passed QC with all stages done
fn stamp_end_date(batch: &mut Batch) {
    if batch.end_date.is_none() && batch.derived_status() == BatchStatus::Completed {
        batch.end_date = Some(Utc::now().date_naive());
    }
}

/// `NotStarted -> Running` for a stage whose predecessors are all complete
pub fn start_stage(
    batch: &mut Batch,
    stage: &str,
    officer: Option<String>,
) -> Result<Transition, WorkflowError> {
    let idx = find_stage(batch, stage)?;
    let current = batch.stages[idx].status;
    if current == StageStatus::Completed {
        return Err(closed(batch, idx));
    }
    if current != StageStatus::NotStarted {
        return Err(invalid(
            batch,
            current,
            StageStatus::Running,
            format!("stage '{}' has already started", batch.stages[idx].name),
        ));
    }
    ensure_workable(batch, StageStatus::Running.as_str())?;
    if let Some(prior) = incomplete_predecessor(batch, idx) {
        return Err(invalid(
            batch,
            current,
            StageStatus::Running,
            format!("earlier stage '{}' is not completed", prior),
        ));
    }

    let from = batch.status;
    let stage = &mut batch.stages[idx];
    stage.status = StageStatus::Running;
    if officer.is_some() {
        stage.officer = officer;
    }
    let name = stage.name.clone();
    start_if_first(batch);
    batch.refresh_status();

    Ok(Transition::new("start_stage", from, batch.status).with_detail(format!("stage: {}", name)))
}

/// Update the informational progress percentage of a running stage
pub fn update_stage_progress(
    batch: &mut Batch,
    stage: &str,
    percent: u8,
) -> Result<Transition, WorkflowError> {
    let idx = find_stage(batch, stage)?;
    let current = &batch.stages[idx];
    if current.status == StageStatus::Completed {
        return Err(closed(batch, idx));
    }
    if current.status != StageStatus::Running {
        return Err(invalid(
            batch,
            format!("{}%", current.progress),
            format!("{}%", percent),
            format!("stage '{}' is {}, not running", current.name, current.status),
        ));
    }
    if percent > 100 || percent < current.progress {
        return Err(invalid(
            batch,
            format!("{}%", current.progress),
            format!("{}%", percent),
            "progress must stay within 0-100 and never decrease",
        ));
    }

    let from = current.progress;
    let name = current.name.clone();
    batch.stages[idx].progress = percent;

    Ok(
        Transition::new("update_progress", format!("{}%", from), format!("{}%", percent))
            .with_detail(format!("stage: {}", name)),
    )
}

/// Move a single SOP step along its lifecycle
///
/// A `NotStarted` stage whose predecessors are complete is started
/// implicitly. Completing a signature-gated step requires a signature.
pub fn record_step_progress(
    batch: &mut Batch,
    stage: &str,
    step_id: &str,
    update: StepUpdate,
    actor_id: &str,
) -> Result<Transition, WorkflowError> {
    let idx = find_stage(batch, stage)?;
    let stage_status = batch.stages[idx].status;
    if stage_status == StageStatus::Completed {
        return Err(closed(batch, idx));
    }
    ensure_workable(batch, update.status.as_str())?;

    let step_idx = batch.stages[idx]
        .steps
        .iter()
        .position(|s| s.id == step_id)
        .ok_or_else(|| WorkflowError::NotFound {
            kind: "step".to_string(),
            id: format!("{}/{}/{}", batch.batch_number, batch.stages[idx].name, step_id),
        })?;

    if stage_status == StageStatus::NotStarted {
        if let Some(prior) = incomplete_predecessor(batch, idx) {
            return Err(invalid(
                batch,
                stage_status,
                StageStatus::Running,
                format!("earlier stage '{}' is not completed", prior),
            ));
        }
    }

    let step = &batch.stages[idx].steps[step_idx];
    if !is_valid_step_transition(step.status, update.status) {
        return Err(invalid(
            batch,
            step.status,
            update.status,
            format!("step '{}' cannot move {} -> {}", step.id, step.status, update.status),
        ));
    }
    if update.status == StepStatus::Completed
        && step.requires_esig
        && update.signature.is_none()
    {
        return Err(WorkflowError::ESignatureRequired {
            stage: batch.stages[idx].name.clone(),
            step: step.id.clone(),
        });
    }

    let from = step.status;
    if stage_status == StageStatus::NotStarted {
        batch.stages[idx].status = StageStatus::Running;
        start_if_first(batch);
    }

    let stage = &mut batch.stages[idx];
    let step = &mut stage.steps[step_idx];
    step.status = update.status;
    if update.value.is_some() {
        step.value = update.value;
    }
    if update.signature.is_some() {
        step.signature = update.signature;
    }
    step.updated_by = Some(actor_id.to_string());
    let detail = format!("stage: {}, step: {}", stage.name, step.id);
    batch.refresh_status();

    Ok(Transition::new("record_step", from, update.status).with_detail(detail))
}

/// Complete a stage
///
/// Replaying this on a completed stage fails with `StageAlreadyClosed`.
/// Completing the last stage moves the batch into QC review.
pub fn advance_stage(batch: &mut Batch, stage: &str) -> Result<Transition, WorkflowError> {
    let idx = find_stage(batch, stage)?;
    let current = batch.stages[idx].status;
    let name = batch.stages[idx].name.clone();

    match current {
        StageStatus::Completed => return Err(closed(batch, idx)),
        StageStatus::QaHold | StageStatus::QcHold => {
            return Err(invalid(
                batch,
                current,
                StageStatus::Completed,
                format!("stage '{}' is on hold", name),
            ))
        }
        StageStatus::NotStarted | StageStatus::Running => {}
    }
    ensure_workable(batch, StageStatus::Completed.as_str())?;
    if let Some(prior) = incomplete_predecessor(batch, idx) {
        return Err(invalid(
            batch,
            current,
            StageStatus::Completed,
            format!("earlier stage '{}' is not completed", prior),
        ));
    }
    let unresolved: Vec<String> = batch.stages[idx]
        .unresolved_steps()
        .iter()
        .map(|s| format!("{} ({})", s.id, s.status))
        .collect();
    if !unresolved.is_empty() {
        return Err(invalid(
            batch,
            current,
            StageStatus::Completed,
            format!("unresolved steps: {}", unresolved.join(", ")),
        ));
    }

    let from = batch.status;
    let stage = &mut batch.stages[idx];
    stage.status = StageStatus::Completed;
    stage.progress = 100;
    start_if_first(batch);

    if batch.all_stages_completed() {
        if batch.qc_dependence == QcDependence::NotApplicable {
            batch.qc_dependence = QcDependence::PendingQc;
        }
        batch.delay_reason = None;
    }
    batch.refresh_status();
    stamp_end_date(batch);

    Ok(Transition::new("advance_stage", from, batch.status).with_detail(format!("stage: {}", name)))
}

/// Put the batch on a QA or QC hold
pub fn place_on_hold(
    batch: &mut Batch,
    reason: &str,
    kind: HoldKind,
    actor_id: &str,
) -> Result<Transition, WorkflowError> {
    let to = BatchStatus::OnHold;
    if batch.hold.is_some() {
        return Err(invalid(batch, batch.status, to, "batch is already on hold"));
    }
    if !matches!(batch.status, BatchStatus::InProgress | BatchStatus::Delayed) {
        return Err(invalid(
            batch,
            batch.status,
            to,
            format!("cannot hold a {} batch", batch.status),
        ));
    }

    let from = batch.status;
    batch.hold = Some(Hold {
        kind,
        placed_by: actor_id.to_string(),
        placed_at: Utc::now(),
    });
    batch.hold_reason = Some(reason.to_string());
    batch.qa_release_status = QaReleaseStatus::Hold;
    if let Some(stage) = batch
        .stages
        .iter_mut()
        .find(|s| s.status == StageStatus::Running)
    {
        stage.status = kind.stage_status();
    }
    batch.refresh_status();

    Ok(Transition::new("place_hold", from, batch.status)
        .with_detail(format!("{} hold: {}", kind, reason)))
}

/// Lift the active hold and restore the derived status
pub fn release_hold(batch: &mut Batch) -> Result<Transition, WorkflowError> {
    let Some(hold) = batch.hold.take() else {
        return Err(invalid(
            batch,
            batch.status,
            batch.derived_status(),
            "batch is not on hold",
        ));
    };

    let from = batch.status;
    let held = hold.kind.stage_status();
    for stage in batch.stages.iter_mut().filter(|s| s.status == held) {
        stage.status = StageStatus::Running;
    }
    batch.hold_reason = None;
    batch.qa_release_status = QaReleaseStatus::Pending;
    batch.refresh_status();

    Ok(Transition::new("release_hold", from, batch.status)
        .with_detail(format!("{} hold lifted", hold.kind)))
}

pub fn mark_delayed(batch: &mut Batch, reason: &str) -> Result<Transition, WorkflowError> {
    if batch.status != BatchStatus::InProgress {
        return Err(invalid(
            batch,
            batch.status,
            BatchStatus::Delayed,
            "only an in-progress batch can be delayed",
        ));
    }
    let from = batch.status;
    batch.delay_reason = Some(reason.to_string());
    batch.refresh_status();
    Ok(Transition::new("mark_delayed", from, batch.status).with_detail(reason.to_string()))
}

pub fn clear_delay(batch: &mut Batch) -> Result<Transition, WorkflowError> {
    if batch.delay_reason.is_none() {
        return Err(invalid(
            batch,
            batch.status,
            batch.derived_status(),
            "batch is not delayed",
        ));
    }
    let from = batch.status;
    batch.delay_reason = None;
    batch.refresh_status();
    Ok(Transition::new("clear_delay", from, batch.status))
}

pub fn block(batch: &mut Batch, reason: &str) -> Result<Transition, WorkflowError> {
    if batch.block_reason.is_some() {
        return Err(invalid(
            batch,
            batch.status,
            BatchStatus::Blocked,
            "batch is already blocked",
        ));
    }
    if batch.status == BatchStatus::Completed {
        return Err(invalid(
            batch,
            batch.status,
            BatchStatus::Blocked,
            "a completed batch awaits its QA decision",
        ));
    }
    let from = batch.status;
    batch.block_reason = Some(reason.to_string());
    batch.refresh_status();
    Ok(Transition::new("block", from, batch.status).with_detail(reason.to_string()))
}

pub fn unblock(batch: &mut Batch) -> Result<Transition, WorkflowError> {
    if batch.block_reason.is_none() {
        return Err(invalid(
            batch,
            batch.status,
            batch.derived_status(),
            "batch is not blocked",
        ));
    }
    let from = batch.status;
    batch.block_reason = None;
    batch.refresh_status();
    Ok(Transition::new("unblock", from, batch.status))
}

/// Record a QC pass or fail
pub fn record_qc_outcome(
    batch: &mut Batch,
    outcome: QcDependence,
) -> Result<Transition, WorkflowError> {
    if !matches!(outcome, QcDependence::PassedQc | QcDependence::FailedQc) {
        return Err(invalid(
            batch,
            batch.qc_dependence,
            outcome,
            "QC outcome must be passed or failed",
        ));
    }
    if !matches!(batch.status, BatchStatus::QcReview | BatchStatus::Completed) {
        return Err(invalid(
            batch,
            batch.qc_dependence,
            outcome,
            format!("QC is recorded after all stages complete, batch is {}", batch.status),
        ));
    }
    if batch.qc_dependence == outcome {
        return Err(invalid(
            batch,
            batch.qc_dependence,
            outcome,
            format!("QC outcome is already {}", outcome),
        ));
    }

    let from = batch.qc_dependence;
    let status_before = batch.status;
    batch.qc_dependence = outcome;
    if outcome == QcDependence::FailedQc {
        batch.end_date = None;
    }
    batch.refresh_status();
    stamp_end_date(batch);

    Ok(Transition::new("record_qc", from, outcome)
        .with_detail(format!("status: {} -> {}", status_before, batch.status)))
}

/// Record the final yield once manufacture is finished
pub fn record_yield(batch: &mut Batch, percent: f64) -> Result<Transition, WorkflowError> {
    let from = batch
        .final_yield
        .map(|y| format!("{:.1}%", y))
        .unwrap_or_else(|| "-".to_string());
    let to = format!("{:.1}%", percent);

    if !(0.0..=100.0).contains(&percent) {
        return Err(invalid(batch, from, to, "yield must be between 0 and 100"));
    }
    if !batch.all_stages_completed() {
        return Err(invalid(
            batch,
            from,
            to,
            "yield can only be recorded after all stages are completed",
        ));
    }

    batch.final_yield = Some(percent);
    Ok(Transition::new("record_yield", from, to))
}
