//! Deviation ledger transitions
//!
//! `Open -> Investigation -> PendingManagerReview -> PendingFinalApproval -> Closed`,
//! with `Rejected` reachable from the first three states by withdrawal and from
//! final approval by QA rejection. The manager bounce
//! `PendingManagerReview -> Investigation` is the only backward edge.

use chrono::Utc;

use crate::core::audit::Transition;
use crate::core::workflow::WorkflowError;
use crate::entities::deviation::{Deviation, DeviationStatus};

/// Investigation findings submitted for manager review
#[derive(Debug, Clone, Default)]
pub struct Investigation {
    pub summary: String,
    pub root_cause: Option<String>,
    pub capa: Option<String>,
}

/// Closed and rejected deviations accept no further change
pub fn ensure_mutable(dev: &Deviation) -> Result<(), WorkflowError> {
    if dev.status.is_terminal() {
        return Err(WorkflowError::TerminalState {
            entity: dev.id.to_string(),
            state: dev.status.to_string(),
        });
    }
    Ok(())
}

/// Whether `from -> to` is a legal deviation edge
pub fn is_valid_transition(from: DeviationStatus, to: DeviationStatus) -> bool {
    use DeviationStatus::*;
    matches!(
        (from, to),
        (Open, Investigation)
            | (Investigation, PendingManagerReview)
            | (PendingManagerReview, PendingFinalApproval)
            | (PendingManagerReview, Investigation)
            | (PendingFinalApproval, Closed)
            | (PendingFinalApproval, Rejected)
            | (Open, Rejected)
            | (Investigation, Rejected)
            | (PendingManagerReview, Rejected)
    )
}

/// Require the deviation to sit in `expected` with a legal edge to `to`
fn expect_status(
    dev: &Deviation,
    expected: DeviationStatus,
    to: DeviationStatus,
) -> Result<(), WorkflowError> {
    ensure_mutable(dev)?;
    if dev.status != expected || !is_valid_transition(dev.status, to) {
        return Err(WorkflowError::InvalidTransition {
            entity: dev.id.to_string(),
            from: dev.status.to_string(),
            to: to.to_string(),
            detail: format!("deviation must be {} (currently {})", expected, dev.status),
        });
    }
    Ok(())
}

fn advance(dev: &mut Deviation, action: &str, to: DeviationStatus) -> Transition {
    let from = dev.status;
    dev.status = to;
    if to.is_terminal() {
        dev.closed = Some(Utc::now());
    }
    Transition::new(action, from, to)
}

/// Assign an investigator: `Open -> Investigation`
pub fn assign(dev: &mut Deviation, investigator: &str) -> Result<Transition, WorkflowError> {
    expect_status(dev, DeviationStatus::Open, DeviationStatus::Investigation)?;
    dev.assigned_to = Some(investigator.to_string());
    Ok(advance(dev, "assign", DeviationStatus::Investigation)
        .with_detail(format!("investigator: {}", investigator)))
}

/// Submit findings: `Investigation -> PendingManagerReview`
pub fn submit_investigation(
    dev: &mut Deviation,
    findings: Investigation,
) -> Result<Transition, WorkflowError> {
    expect_status(
        dev,
        DeviationStatus::Investigation,
        DeviationStatus::PendingManagerReview,
    )?;
    if findings.summary.trim().is_empty() {
        return Err(WorkflowError::InvalidTransition {
            entity: dev.id.to_string(),
            from: dev.status.to_string(),
            to: DeviationStatus::PendingManagerReview.to_string(),
            detail: "investigation summary is required".to_string(),
        });
    }
    dev.investigation_summary = Some(findings.summary);
    if findings.root_cause.is_some() {
        dev.root_cause = findings.root_cause;
    }
    if findings.capa.is_some() {
        dev.capa = findings.capa;
    }
    Ok(advance(
        dev,
        "submit_investigation",
        DeviationStatus::PendingManagerReview,
    ))
}

/// Manager decision: approve forwards to QA, reject sends back for rework
pub fn manager_review(
    dev: &mut Deviation,
    approve: bool,
    reviewer: &str,
    comment: Option<&str>,
) -> Result<Transition, WorkflowError> {
    let to = if approve {
        DeviationStatus::PendingFinalApproval
    } else {
        DeviationStatus::Investigation
    };
    expect_status(dev, DeviationStatus::PendingManagerReview, to)?;

    dev.manager_reviewed_by = Some(reviewer.to_string());
    let transition = if approve {
        advance(dev, "manager_approve", to)
    } else {
        dev.rework_count += 1;
        advance(dev, "manager_rework", to)
    };
    Ok(match comment {
        Some(c) => transition.with_detail(c.to_string()),
        None => transition,
    })
}

/// QA Head closes the deviation
pub fn final_approve(dev: &mut Deviation, approver: &str) -> Result<Transition, WorkflowError> {
    expect_status(
        dev,
        DeviationStatus::PendingFinalApproval,
        DeviationStatus::Closed,
    )?;
    dev.approved_by = Some(approver.to_string());
    Ok(advance(dev, "final_approve", DeviationStatus::Closed))
}

/// QA Head rejects the deviation at final approval
pub fn final_reject(
    dev: &mut Deviation,
    approver: &str,
    reason: &str,
) -> Result<Transition, WorkflowError> {
    expect_status(
        dev,
        DeviationStatus::PendingFinalApproval,
        DeviationStatus::Rejected,
    )?;
    dev.approved_by = Some(approver.to_string());
    dev.rejection_reason = Some(reason.to_string());
    Ok(advance(dev, "final_reject", DeviationStatus::Rejected).with_detail(reason.to_string()))
}

/// Withdraw a deviation raised in error, before it reaches final approval
pub fn withdraw(dev: &mut Deviation, reason: &str) -> Result<Transition, WorkflowError> {
    ensure_mutable(dev)?;
    let to = DeviationStatus::Rejected;
    let final_stage = dev.status == DeviationStatus::PendingFinalApproval;
    if final_stage || !is_valid_transition(dev.status, to) {
        return Err(WorkflowError::InvalidTransition {
            entity: dev.id.to_string(),
            from: dev.status.to_string(),
            to: to.to_string(),
            detail: "awaiting final approval; use final reject instead".to_string(),
        });
    }
    dev.rejection_reason = Some(reason.to_string());
    Ok(advance(dev, "withdraw", DeviationStatus::Rejected).with_detail(reason.to_string()))
}
