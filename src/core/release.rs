//! Release gate
//!
//! A batch may be released only when four independent checks pass:
//!
//! 1. every BMR checklist item is verified
//! 2. every deviation linked to the batch is closed or rejected
//! 3. the QC dependency has passed
//! 4. every stage is completed
//!
//! [`evaluate`] fails closed: a decision is ready only if all four checks
//! pass, and a not-ready decision always lists what failed.

use serde::{Deserialize, Serialize};

use crate::core::audit::Transition;
use crate::core::workflow::WorkflowError;
use crate::entities::batch::{
    Batch, BatchStatus, BmrStatus, QaReleaseStatus, QcDependence, StageStatus,
};
use crate::entities::deviation::Deviation;

/// The individual release conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    BmrComplete,
    DeviationsResolved,
    QcPassed,
    StagesCompleted,
}

impl GateCheck {
    pub fn all() -> &'static [GateCheck] {
        &[
            GateCheck::BmrComplete,
            GateCheck::DeviationsResolved,
            GateCheck::QcPassed,
            GateCheck::StagesCompleted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateCheck::BmrComplete => "bmr_complete",
            GateCheck::DeviationsResolved => "deviations_resolved",
            GateCheck::QcPassed => "qc_passed",
            GateCheck::StagesCompleted => "stages_completed",
        }
    }
}

impl std::fmt::Display for GateCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failing gate check with the items responsible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub check: GateCheck,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl std::fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.check, self.detail)?;
        if !self.items.is_empty() {
            write!(f, " [{}]", self.items.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome of evaluating the release gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDecision {
    pub batch_number: String,
    pub ready: bool,
    pub passed: Vec<GateCheck>,
    pub failing: Vec<FailedCheck>,
}

impl ReleaseDecision {
    pub fn is_failing(&self, check: GateCheck) -> bool {
        self.failing.iter().any(|f| f.check == check)
    }
}

/// Evaluate the release gate against a batch and its deviations
///
/// Deviations not linked to the batch's number are ignored.
pub fn evaluate(batch: &Batch, deviations: &[Deviation]) -> ReleaseDecision {
    let mut passed = Vec::new();
    let mut failing = Vec::new();

    let unverified: Vec<String> = batch
        .bmr
        .iter()
        .filter(|s| s.status != BmrStatus::Verified)
        .map(|s| format!("{} ({})", s.name, s.status))
        .collect();
    if unverified.is_empty() {
        passed.push(GateCheck::BmrComplete);
    } else {
        failing.push(FailedCheck {
            check: GateCheck::BmrComplete,
            detail: format!("{} of {} BMR items not verified", unverified.len(), batch.bmr.len()),
            items: unverified,
        });
    }

    let open: Vec<String> = deviations
        .iter()
        .filter(|d| d.batch_number == batch.batch_number && !d.status.is_resolved())
        .map(|d| format!("{} ({})", d.id, d.status))
        .collect();
    if open.is_empty() {
        passed.push(GateCheck::DeviationsResolved);
    } else {
        failing.push(FailedCheck {
            check: GateCheck::DeviationsResolved,
            detail: format!("{} open deviation(s)", open.len()),
            items: open,
        });
    }

    if batch.qc_dependence == QcDependence::PassedQc {
        passed.push(GateCheck::QcPassed);
    } else {
        failing.push(FailedCheck {
            check: GateCheck::QcPassed,
            detail: format!("QC status is {}", batch.qc_dependence),
            items: Vec::new(),
        });
    }

    let incomplete: Vec<String> = batch
        .stages
        .iter()
        .filter(|s| s.status != StageStatus::Completed)
        .map(|s| format!("{} ({})", s.name, s.status))
        .collect();
    if batch.stages.is_empty() {
        failing.push(FailedCheck {
            check: GateCheck::StagesCompleted,
            detail: "no stages planned".to_string(),
            items: Vec::new(),
        });
    } else if incomplete.is_empty() {
        passed.push(GateCheck::StagesCompleted);
    } else {
        failing.push(FailedCheck {
            check: GateCheck::StagesCompleted,
            detail: format!("{} stage(s) not completed", incomplete.len()),
            items: incomplete,
        });
    }

    ReleaseDecision {
        batch_number: batch.batch_number.clone(),
        ready: failing.is_empty(),
        passed,
        failing,
    }
}

fn ensure_decidable(batch: &Batch, to: QaReleaseStatus) -> Result<(), WorkflowError> {
    if !matches!(batch.status, BatchStatus::Completed | BatchStatus::QcReview) {
        return Err(WorkflowError::InvalidTransition {
            entity: batch.batch_number.clone(),
            from: batch.status.to_string(),
            to: to.to_string(),
            detail: "release decisions require a completed or QC-review batch".to_string(),
        });
    }
    Ok(())
}

/// Commit the release if the decision is ready
///
/// The gate is checked first, so an unready batch always reports its failing
/// checks.
pub fn release(batch: &mut Batch, decision: &ReleaseDecision) -> Result<Transition, WorkflowError> {
    if !decision.ready {
        return Err(WorkflowError::GateNotSatisfied {
            batch: batch.batch_number.clone(),
            failing: decision.failing.clone(),
        });
    }
    ensure_decidable(batch, QaReleaseStatus::Released)?;

    let from = batch.qa_release_status;
    batch.qa_release_status = QaReleaseStatus::Released;
    batch.hold_reason = None;
    Ok(Transition::new("release", from, QaReleaseStatus::Released))
}

/// Reject the batch; legal regardless of the gate
pub fn reject(batch: &mut Batch, reason: &str) -> Result<Transition, WorkflowError> {
    ensure_decidable(batch, QaReleaseStatus::Rejected)?;
    let from = batch.qa_release_status;
    batch.qa_release_status = QaReleaseStatus::Rejected;
    batch.hold_reason = Some(reason.to_string());
    Ok(Transition::new("reject", from, QaReleaseStatus::Rejected).with_detail(reason.to_string()))
}

/// Change a BMR checklist item
///
/// Any change to a different status is accepted, except that a verified item
/// can only be reopened for clarification.
pub fn update_bmr_step(
    batch: &mut Batch,
    name: &str,
    status: BmrStatus,
    note: Option<String>,
    actor_id: &str,
) -> Result<Transition, WorkflowError> {
    let batch_number = batch.batch_number.clone();
    let item = batch
        .bmr
        .iter_mut()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| WorkflowError::NotFound {
            kind: "bmr step".to_string(),
            id: format!("{}/{}", batch_number, name),
        })?;

    let from = item.status;
    let allowed = from != status
        && (from != BmrStatus::Verified || status == BmrStatus::Clarification);
    if !allowed {
        let detail = if from == status {
            format!("'{}' is already {}", item.name, status)
        } else {
            format!("verified item '{}' can only be reopened for clarification", item.name)
        };
        return Err(WorkflowError::InvalidTransition {
            entity: batch_number,
            from: from.to_string(),
            to: status.to_string(),
            detail,
        });
    }

    item.status = status;
    if status == BmrStatus::Verified {
        item.verified_by = Some(actor_id.to_string());
    }
    if note.is_some() {
        item.note = note;
    }
    let detail = format!("bmr: {}", item.name);
    Ok(Transition::new("update_bmr", from, status).with_detail(detail))
}
