//! Workflow engine for batch lifecycle, deviations and release
//!
//! [`WorkflowEngine`] is the single entry point for every operation. Each
//! mutating call:
//!
//! 1. checks the actor's capability against the [`Policy`]
//! 2. takes the target entity's write lock
//! 3. refuses further change to a terminal entity
//! 4. applies a pure transition from `manufacturing`, `ledger` or `release`
//!    to a draft copy, committing the draft only on success
//! 5. appends one hash-chained [`AuditEntry`]
//!
//! and returns the updated aggregate together with that entry.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::audit::{AuditEntry, AuditError, AuditTrail, Transition};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::ledger::{self, Investigation};
use crate::core::manufacturing::{self, StepUpdate};
use crate::core::query::{BatchFilter, Dashboard, DeviationFilter};
use crate::core::release::{self, FailedCheck, ReleaseDecision};
use crate::core::store::{Snapshot, Store, SNAPSHOT_VERSION};
use crate::core::team::{Actor, Operation, Policy, Role};
use crate::entities::batch::{Batch, BatchPlan, BmrStatus, HoldKind, QcDependence};
use crate::entities::deviation::{Department, Deviation, Severity};

/// Errors that can occur during workflow operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid transition for {entity}: {from} → {to} ({detail})")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
        detail: String,
    },

    #[error("Stage '{stage}' of batch {batch} is already completed")]
    StageAlreadyClosed { batch: String, stage: String },

    #[error("{entity} is {state} and can no longer be changed")]
    TerminalState { entity: String, state: String },

    #[error("Step '{step}' in stage '{stage}' requires an electronic signature to complete")]
    ESignatureRequired { stage: String, step: String },

    #[error("Batch {batch} is not releasable: {} check(s) failing", .failing.len())]
    GateNotSatisfied {
        batch: String,
        failing: Vec<FailedCheck>,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Authorization required: {actor} ({role}) may not {operation}")]
    Unauthorized {
        actor: String,
        role: Role,
        operation: Operation,
    },

    #[error("State file error: {message}")]
    Persistence { message: String },

    #[error("Audit trail failed verification: {0}")]
    AuditChainBroken(#[from] AuditError),
}

/// Stable machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    StageAlreadyClosed,
    TerminalState,
    ESignatureRequired,
    GateNotSatisfied,
    NotFound,
    Unauthorized,
    Persistence,
    AuditChainBroken,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::StageAlreadyClosed => "stage_already_closed",
            ErrorKind::TerminalState => "terminal_state",
            ErrorKind::ESignatureRequired => "esignature_required",
            ErrorKind::GateNotSatisfied => "gate_not_satisfied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Persistence => "persistence",
            ErrorKind::AuditChainBroken => "audit_chain_broken",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            WorkflowError::StageAlreadyClosed { .. } => ErrorKind::StageAlreadyClosed,
            WorkflowError::TerminalState { .. } => ErrorKind::TerminalState,
            WorkflowError::ESignatureRequired { .. } => ErrorKind::ESignatureRequired,
            WorkflowError::GateNotSatisfied { .. } => ErrorKind::GateNotSatisfied,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::Unauthorized { .. } => ErrorKind::Unauthorized,
            WorkflowError::Persistence { .. } => ErrorKind::Persistence,
            WorkflowError::AuditChainBroken(_) => ErrorKind::AuditChainBroken,
        }
    }

    /// Failing release checks, if this is a gate failure
    pub fn failing_checks(&self) -> &[FailedCheck] {
        match self {
            WorkflowError::GateNotSatisfied { failing, .. } => failing,
            _ => &[],
        }
    }
}

impl miette::Diagnostic for WorkflowError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("brt::{}", self.kind())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self {
            WorkflowError::GateNotSatisfied { failing, .. } => failing
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n"),
            WorkflowError::ESignatureRequired { .. } => {
                "Pass --sign <meaning> to sign the step as the current actor".to_string()
            }
            WorkflowError::Unauthorized { .. } => {
                "Use --role or BRT_ROLE to act under a role with this capability".to_string()
            }
            WorkflowError::StageAlreadyClosed { .. } => {
                "Completed stages cannot be reopened".to_string()
            }
            WorkflowError::AuditChainBroken(_) => {
                "The state file was modified outside brt; restore it from backup".to_string()
            }
            _ => return None,
        };
        Some(Box::new(help))
    }
}

/// Result of a mutating operation
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    /// The aggregate as committed
    pub aggregate: T,
    /// Audit entry appended for this change
    pub audit: AuditEntry,
}

/// Fields for raising a new deviation
#[derive(Debug, Clone)]
pub struct NewDeviation {
    pub batch_number: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source_dept: Department,
}

fn refuse(op: Operation, entity: &str, err: WorkflowError) -> WorkflowError {
    warn!(operation = %op, entity, kind = %err.kind(), "{}", err);
    err
}

/// Workflow engine owning the store, the policy and the audit trail
pub struct WorkflowEngine {
    store: Store,
    policy: Policy,
    audit: Mutex<AuditTrail>,
}

impl WorkflowEngine {
    /// Create an empty engine
    pub fn new(policy: Policy) -> Self {
        Self {
            store: Store::new(),
            policy,
            audit: Mutex::new(AuditTrail::new()),
        }
    }

    /// Rebuild an engine from a saved snapshot, verifying the audit chain and
    /// the consistency of every stored batch status
    pub fn from_snapshot(snapshot: Snapshot, policy: Policy) -> Result<Self, WorkflowError> {
        let audit = AuditTrail::from_entries(snapshot.audit)?;
        let store = Store::from_parts(snapshot.batches, snapshot.deviations)?;
        if audit.is_empty() && store.batch_count() + store.deviation_count() > 0 {
            return Err(WorkflowError::Persistence {
                message: "state holds records but no audit trail".to_string(),
            });
        }
        debug!(
            batches = store.batch_count(),
            deviations = store.deviation_count(),
            audit_entries = audit.len(),
            "engine loaded"
        );
        Ok(Self {
            store,
            policy,
            audit: Mutex::new(audit),
        })
    }

    /// Capture the current state for persistence
    ///
    /// Entities are cloned before the audit trail, so under concurrent use
    /// the trail may contain entries newer than the captured entities.
    pub fn snapshot(&self) -> Snapshot {
        let mut batches = self.store.all_batches();
        batches.sort_by(|a, b| a.batch_number.cmp(&b.batch_number));
        let mut deviations = self.store.all_deviations();
        deviations.sort_by(|a, b| a.opened.cmp(&b.opened).then(a.id.cmp(&b.id)));
        let audit = self.audit.lock().entries().to_vec();
        Snapshot {
            version: SNAPSHOT_VERSION,
            batches,
            deviations,
            audit,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn authorize(&self, actor: &Actor, op: Operation) -> Result<(), WorkflowError> {
        self.policy
            .check(actor, op)
            .map_err(|e| refuse(op, &actor.id, e))
    }

    fn commit(
        &self,
        entity: &EntityId,
        actor: &Actor,
        op: Operation,
        transition: Transition,
    ) -> AuditEntry {
        let entry = self.audit.lock().append(&entity.to_string(), actor, transition);
        info!(
            operation = %op,
            entity = %entity,
            actor = %actor.id,
            role = %actor.role,
            from = %entry.from,
            to = %entry.to,
            seq = entry.seq,
            "transition applied"
        );
        entry
    }

    fn mutate_batch<F>(
        &self,
        actor: &Actor,
        op: Operation,
        id: &EntityId,
        apply: F,
    ) -> Result<Outcome<Batch>, WorkflowError>
    where
        F: FnOnce(&mut Batch) -> Result<Transition, WorkflowError>,
    {
        self.authorize(actor, op)?;
        let key = id.to_string();
        let handle = self.store.batch(id).map_err(|e| refuse(op, &key, e))?;
        let mut guard = handle.write();
        manufacturing::ensure_mutable(&guard).map_err(|e| refuse(op, &key, e))?;

        let mut draft = guard.clone();
        let transition = apply(&mut draft).map_err(|e| refuse(op, &key, e))?;
        draft.revision += 1;
        *guard = draft;

        let audit = self.commit(id, actor, op, transition);
        Ok(Outcome {
            aggregate: guard.clone(),
            audit,
        })
    }

    fn mutate_deviation<F>(
        &self,
        actor: &Actor,
        op: Operation,
        id: &EntityId,
        apply: F,
    ) -> Result<Outcome<Deviation>, WorkflowError>
    where
        F: FnOnce(&mut Deviation) -> Result<Transition, WorkflowError>,
    {
        self.authorize(actor, op)?;
        let key = id.to_string();
        let handle = self.store.deviation(id).map_err(|e| refuse(op, &key, e))?;
        let mut guard = handle.write();
        ledger::ensure_mutable(&guard).map_err(|e| refuse(op, &key, e))?;

        let mut draft = guard.clone();
        let transition = apply(&mut draft).map_err(|e| refuse(op, &key, e))?;
        draft.revision += 1;
        *guard = draft;

        let audit = self.commit(id, actor, op, transition);
        Ok(Outcome {
            aggregate: guard.clone(),
            audit,
        })
    }

    // =========================================================================
    // Batch state machine
    // =========================================================================

    /// Create a planned batch
    pub fn plan_batch(
        &self,
        actor: &Actor,
        plan: BatchPlan,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        let op = Operation::PlanBatch;
        self.authorize(actor, op)?;
        let number = plan.batch_number.clone();
        manufacturing::validate_plan(&plan).map_err(|e| refuse(op, &number, e))?;
        let batch = Batch::from_plan(plan, actor.id.clone());
        let id = batch.id;
        let transition = Transition::new("plan_batch", "-", batch.status).with_detail(format!(
            "{} {} {}, {} stage(s)",
            batch.product,
            batch.quantity,
            batch.unit,
            batch.stages.len()
        ));

        let handle = self
            .store
            .insert_batch(batch)
            .map_err(|e| refuse(op, &number, e))?;
        let guard = handle.read();
        let audit = self.commit(&id, actor, op, transition);
        Ok(Outcome {
            aggregate: guard.clone(),
            audit,
        })
    }

    pub fn start_stage(
        &self,
        actor: &Actor,
        batch: &EntityId,
        stage: &str,
        officer: Option<String>,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        let officer = officer.or_else(|| Some(actor.id.clone()));
        self.mutate_batch(actor, Operation::StartStage, batch, |b| {
            manufacturing::start_stage(b, stage, officer)
        })
    }

    pub fn update_stage_progress(
        &self,
        actor: &Actor,
        batch: &EntityId,
        stage: &str,
        percent: u8,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::UpdateProgress, batch, |b| {
            manufacturing::update_stage_progress(b, stage, percent)
        })
    }

    pub fn record_step_progress(
        &self,
        actor: &Actor,
        batch: &EntityId,
        stage: &str,
        step: &str,
        update: StepUpdate,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::RecordStep, batch, |b| {
            manufacturing::record_step_progress(b, stage, step, update, &actor.id)
        })
    }

    pub fn advance_stage(
        &self,
        actor: &Actor,
        batch: &EntityId,
        stage: &str,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::AdvanceStage, batch, |b| {
            manufacturing::advance_stage(b, stage)
        })
    }

    pub fn place_on_hold(
        &self,
        actor: &Actor,
        batch: &EntityId,
        reason: &str,
        kind: HoldKind,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::PlaceHold, batch, |b| {
            manufacturing::place_on_hold(b, reason, kind, &actor.id)
        })
    }

    pub fn release_hold(
        &self,
        actor: &Actor,
        batch: &EntityId,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::ReleaseHold, batch, manufacturing::release_hold)
    }

    pub fn mark_delayed(
        &self,
        actor: &Actor,
        batch: &EntityId,
        reason: &str,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::MarkDelayed, batch, |b| {
            manufacturing::mark_delayed(b, reason)
        })
    }

    pub fn clear_delay(
        &self,
        actor: &Actor,
        batch: &EntityId,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::MarkDelayed, batch, manufacturing::clear_delay)
    }

    pub fn block(
        &self,
        actor: &Actor,
        batch: &EntityId,
        reason: &str,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::Block, batch, |b| manufacturing::block(b, reason))
    }

    pub fn unblock(
        &self,
        actor: &Actor,
        batch: &EntityId,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::Block, batch, manufacturing::unblock)
    }

    pub fn record_qc_outcome(
        &self,
        actor: &Actor,
        batch: &EntityId,
        outcome: QcDependence,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::RecordQc, batch, |b| {
            manufacturing::record_qc_outcome(b, outcome)
        })
    }

    pub fn record_yield(
        &self,
        actor: &Actor,
        batch: &EntityId,
        percent: f64,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::RecordYield, batch, |b| {
            manufacturing::record_yield(b, percent)
        })
    }

    // =========================================================================
    // Deviation ledger
    // =========================================================================

    /// Raise a deviation against an existing batch
    ///
    /// Holds the batch write lock while inserting, so a concurrent release
    /// either sees the new deviation or completes before it exists.
    pub fn open_deviation(
        &self,
        actor: &Actor,
        new: NewDeviation,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        let op = Operation::OpenDeviation;
        self.authorize(actor, op)?;
        let batch_id = self.store.batch_id(&new.batch_number).ok_or_else(|| {
            refuse(
                op,
                &new.batch_number,
                WorkflowError::NotFound {
                    kind: "batch".to_string(),
                    id: new.batch_number.clone(),
                },
            )
        })?;
        let handle = self.store.batch(&batch_id)?;
        let batch = handle.write();

        let mut dev = Deviation::new(
            batch.batch_number.clone(),
            new.title,
            new.severity,
            new.source_dept,
            actor.id.clone(),
        );
        dev.description = new.description;
        let id = dev.id;
        let transition = Transition::new("open_deviation", "-", dev.status).with_detail(format!(
            "batch: {}, severity: {}",
            dev.batch_number, dev.severity
        ));

        let dev_handle = self.store.insert_deviation(dev);
        let audit = self.commit(&id, actor, op, transition);
        drop(batch);

        let aggregate = dev_handle.read().clone();
        Ok(Outcome { aggregate, audit })
    }

    pub fn assign_deviation(
        &self,
        actor: &Actor,
        deviation: &EntityId,
        investigator: &str,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::AssignDeviation, deviation, |d| {
            ledger::assign(d, investigator)
        })
    }

    pub fn submit_investigation(
        &self,
        actor: &Actor,
        deviation: &EntityId,
        findings: Investigation,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::SubmitInvestigation, deviation, |d| {
            ledger::submit_investigation(d, findings)
        })
    }

    pub fn manager_review(
        &self,
        actor: &Actor,
        deviation: &EntityId,
        approve: bool,
        comment: Option<&str>,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::ManagerReview, deviation, |d| {
            ledger::manager_review(d, approve, &actor.id, comment)
        })
    }

    pub fn final_approve(
        &self,
        actor: &Actor,
        deviation: &EntityId,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::FinalDecision, deviation, |d| {
            ledger::final_approve(d, &actor.id)
        })
    }

    pub fn final_reject(
        &self,
        actor: &Actor,
        deviation: &EntityId,
        reason: &str,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::FinalDecision, deviation, |d| {
            ledger::final_reject(d, &actor.id, reason)
        })
    }

    pub fn withdraw_deviation(
        &self,
        actor: &Actor,
        deviation: &EntityId,
        reason: &str,
    ) -> Result<Outcome<Deviation>, WorkflowError> {
        self.mutate_deviation(actor, Operation::WithdrawDeviation, deviation, |d| {
            ledger::withdraw(d, reason)
        })
    }

    // =========================================================================
    // Release gate
    // =========================================================================

    fn decide(&self, batch: &Batch) -> ReleaseDecision {
        let deviations: Vec<Deviation> = self
            .store
            .deviations_for(&batch.batch_number)
            .iter()
            .map(|h| h.read().clone())
            .collect();
        let decision = release::evaluate(batch, &deviations);
        let failing: Vec<&str> = decision.failing.iter().map(|f| f.check.as_str()).collect();
        debug!(
            batch = %batch.batch_number,
            ready = decision.ready,
            ?failing,
            "release gate evaluated"
        );
        decision
    }

    /// Evaluate the release gate against a consistent view of the batch
    pub fn evaluate(&self, batch: &EntityId) -> Result<ReleaseDecision, WorkflowError> {
        let handle = self.store.batch(batch)?;
        let guard = handle.read();
        Ok(self.decide(&guard))
    }

    /// Release the batch if the gate is satisfied
    pub fn release(
        &self,
        actor: &Actor,
        batch: &EntityId,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::ReleaseBatch, batch, |b| {
            let decision = self.decide(b);
            release::release(b, &decision)
        })
    }

    /// Reject the batch regardless of the gate
    pub fn reject(
        &self,
        actor: &Actor,
        batch: &EntityId,
        reason: &str,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::RejectBatch, batch, |b| {
            release::reject(b, reason)
        })
    }

    pub fn update_bmr_step(
        &self,
        actor: &Actor,
        batch: &EntityId,
        step: &str,
        status: BmrStatus,
        note: Option<String>,
    ) -> Result<Outcome<Batch>, WorkflowError> {
        self.mutate_batch(actor, Operation::UpdateBmr, batch, |b| {
            release::update_bmr_step(b, step, status, note, &actor.id)
        })
    }

    // =========================================================================
    // Read model
    // =========================================================================

    /// Resolve a batch id or batch number
    pub fn resolve_batch(&self, reference: &str) -> Result<EntityId, WorkflowError> {
        if let Ok(id) = reference.parse::<EntityId>() {
            if id.prefix() == EntityPrefix::Bat {
                return Ok(id);
            }
        }
        self.store
            .batch_id(reference)
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "batch".to_string(),
                id: reference.to_string(),
            })
    }

    /// Resolve a full deviation id or a unique id prefix
    pub fn resolve_deviation(&self, reference: &str) -> Result<EntityId, WorkflowError> {
        if let Ok(id) = reference.parse::<EntityId>() {
            if id.prefix() == EntityPrefix::Dev {
                return Ok(id);
            }
        }
        let needle = reference.to_uppercase();
        let matches: Vec<EntityId> = self
            .store
            .all_deviations()
            .iter()
            .map(|d| d.id)
            .filter(|id| id.to_string().starts_with(&needle))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            _ => Err(WorkflowError::NotFound {
                kind: "deviation".to_string(),
                id: reference.to_string(),
            }),
        }
    }

    pub fn batch(&self, id: &EntityId) -> Result<Batch, WorkflowError> {
        Ok(self.store.batch(id)?.read().clone())
    }

    pub fn batch_by_number(&self, number: &str) -> Result<Batch, WorkflowError> {
        let id = self
            .store
            .batch_id(number)
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "batch".to_string(),
                id: number.to_string(),
            })?;
        self.batch(&id)
    }

    /// Batches matching the filter, ordered by batch number
    pub fn batches(&self, filter: &BatchFilter) -> Vec<Batch> {
        let mut batches: Vec<Batch> = self
            .store
            .all_batches()
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        batches.sort_by(|a, b| a.batch_number.cmp(&b.batch_number));
        batches
    }

    pub fn deviation(&self, id: &EntityId) -> Result<Deviation, WorkflowError> {
        Ok(self.store.deviation(id)?.read().clone())
    }

    /// Deviations linked to a batch number, oldest first
    pub fn deviations_for_batch(&self, batch_number: &str) -> Vec<Deviation> {
        let mut devs: Vec<Deviation> = self
            .store
            .deviations_for(batch_number)
            .iter()
            .map(|h| h.read().clone())
            .collect();
        devs.sort_by(|a, b| a.opened.cmp(&b.opened).then(a.id.cmp(&b.id)));
        devs
    }

    /// Deviations matching the filter, oldest first
    pub fn deviations(&self, filter: &DeviationFilter) -> Vec<Deviation> {
        let mut devs: Vec<Deviation> = self
            .store
            .all_deviations()
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        devs.sort_by(|a, b| a.opened.cmp(&b.opened).then(a.id.cmp(&b.id)));
        devs
    }

    /// Audit entries, optionally restricted to one entity
    pub fn audit_trail(&self, entity: Option<&EntityId>) -> Vec<AuditEntry> {
        let trail = self.audit.lock();
        match entity {
            Some(id) => trail.for_entity(&id.to_string()),
            None => trail.entries().to_vec(),
        }
    }

    /// Entries recorded by one actor, oldest first
    pub fn audit_by_actor(&self, actor: &str) -> Vec<AuditEntry> {
        self.audit.lock().by_actor(actor)
    }

    /// Re-verify the whole audit chain
    pub fn verify_audit(&self) -> Result<usize, WorkflowError> {
        let trail = self.audit.lock();
        trail.verify()?;
        Ok(trail.len())
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::build(&self.store.all_batches(), &self.store.all_deviations())
    }
}
