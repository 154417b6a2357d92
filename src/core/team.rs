//! Roles, actors and the capability policy
//!
//! Every engine operation is invoked on behalf of an [`Actor`] that claims a
//! [`Role`]. The [`Policy`] decides whether that role may perform the
//! [`Operation`]; state-machine code never branches on roles itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::core::workflow::WorkflowError;

/// Plant roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProductionHead,
    ProductionManager,
    ProductionOperator,
    QaHead,
    QaManager,
    QaOperator,
    QcHead,
    QcManager,
    QcOperator,
    PlantHead,
    SystemAdmin,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[
            Role::ProductionHead,
            Role::ProductionManager,
            Role::ProductionOperator,
            Role::QaHead,
            Role::QaManager,
            Role::QaOperator,
            Role::QcHead,
            Role::QcManager,
            Role::QcOperator,
            Role::PlantHead,
            Role::SystemAdmin,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ProductionHead => "production_head",
            Role::ProductionManager => "production_manager",
            Role::ProductionOperator => "production_operator",
            Role::QaHead => "qa_head",
            Role::QaManager => "qa_manager",
            Role::QaOperator => "qa_operator",
            Role::QcHead => "qc_head",
            Role::QcManager => "qc_manager",
            Role::QcOperator => "qc_operator",
            Role::PlantHead => "plant_head",
            Role::SystemAdmin => "system_admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace(['-', ' '], "_");
        Role::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == normalized)
            .or(match normalized.as_str() {
                "prod_head" => Some(Role::ProductionHead),
                "prod_manager" => Some(Role::ProductionManager),
                "operator" | "prod_operator" | "production_officer" => {
                    Some(Role::ProductionOperator)
                }
                "qa_officer" => Some(Role::QaOperator),
                "qc_officer" | "analyst" => Some(Role::QcOperator),
                "admin" => Some(Role::SystemAdmin),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Whoever is invoking an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

/// Capability-checked engine operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PlanBatch,
    StartStage,
    UpdateProgress,
    RecordStep,
    AdvanceStage,
    PlaceHold,
    ReleaseHold,
    MarkDelayed,
    Block,
    RecordQc,
    RecordYield,
    OpenDeviation,
    AssignDeviation,
    SubmitInvestigation,
    ManagerReview,
    FinalDecision,
    WithdrawDeviation,
    UpdateBmr,
    ReleaseBatch,
    RejectBatch,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PlanBatch => "plan_batch",
            Operation::StartStage => "start_stage",
            Operation::UpdateProgress => "update_progress",
            Operation::RecordStep => "record_step",
            Operation::AdvanceStage => "advance_stage",
            Operation::PlaceHold => "place_hold",
            Operation::ReleaseHold => "release_hold",
            Operation::MarkDelayed => "mark_delayed",
            Operation::Block => "block",
            Operation::RecordQc => "record_qc",
            Operation::RecordYield => "record_yield",
            Operation::OpenDeviation => "open_deviation",
            Operation::AssignDeviation => "assign_deviation",
            Operation::SubmitInvestigation => "submit_investigation",
            Operation::ManagerReview => "manager_review",
            Operation::FinalDecision => "final_decision",
            Operation::WithdrawDeviation => "withdraw_deviation",
            Operation::UpdateBmr => "update_bmr",
            Operation::ReleaseBatch => "release_batch",
            Operation::RejectBatch => "reject_batch",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy configuration as it appears in config files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Whether capability checks are enforced at all
    pub enforce: bool,

    /// Per-operation overrides of the allowed roles
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub grants: HashMap<Operation, Vec<Role>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            grants: HashMap::new(),
        }
    }
}

/// Maps operations to the roles allowed to invoke them
#[derive(Debug, Clone)]
pub struct Policy {
    enforce: bool,
    grants: HashMap<Operation, Vec<Role>>,
}

impl Default for Policy {
    fn default() -> Self {
        use Operation::*;
        use Role::*;

        let production = vec![ProductionOperator, ProductionManager, ProductionHead];
        let holds = vec![QaHead, QaManager, ProductionManager, ProductionHead];

        let mut grants = HashMap::new();
        grants.insert(PlanBatch, vec![ProductionManager, ProductionHead, PlantHead]);
        grants.insert(StartStage, production.clone());
        grants.insert(UpdateProgress, production.clone());
        grants.insert(RecordStep, production.clone());
        grants.insert(AdvanceStage, production.clone());
        grants.insert(RecordYield, production);
        grants.insert(PlaceHold, holds.clone());
        grants.insert(ReleaseHold, holds);
        grants.insert(MarkDelayed, vec![ProductionManager, ProductionHead]);
        grants.insert(
            Block,
            vec![QaHead, QaManager, ProductionManager, ProductionHead, PlantHead],
        );
        grants.insert(RecordQc, vec![QcOperator, QcManager, QcHead]);
        grants.insert(OpenDeviation, Role::all().to_vec());
        grants.insert(AssignDeviation, vec![QaManager, QaHead]);
        grants.insert(
            SubmitInvestigation,
            vec![QaOperator, QaManager, QcOperator, QcManager],
        );
        grants.insert(ManagerReview, vec![QaManager]);
        grants.insert(FinalDecision, vec![QaHead]);
        grants.insert(WithdrawDeviation, vec![QaManager, QaHead]);
        grants.insert(UpdateBmr, vec![QaOperator, QaManager, QaHead]);
        grants.insert(ReleaseBatch, vec![QaHead]);
        grants.insert(RejectBatch, vec![QaHead]);

        Self {
            enforce: true,
            grants,
        }
    }
}

impl Policy {
    /// Build a policy from defaults plus configured overrides
    pub fn from_config(config: &PolicyConfig) -> Self {
        let mut policy = Self::default();
        policy.enforce = config.enforce;
        for (op, roles) in &config.grants {
            policy.grants.insert(*op, roles.clone());
        }
        policy
    }

    /// A policy that allows everything
    pub fn permissive() -> Self {
        Self {
            enforce: false,
            ..Self::default()
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Roles allowed to perform an operation
    pub fn allowed_roles(&self, op: Operation) -> &[Role] {
        self.grants.get(&op).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn allows(&self, role: Role, op: Operation) -> bool {
        !self.enforce || self.allowed_roles(op).contains(&role)
    }

    /// Check that the actor may perform the operation
    pub fn check(&self, actor: &Actor, op: Operation) -> Result<(), WorkflowError> {
        if self.allows(actor.role, op) {
            Ok(())
        } else {
            Err(WorkflowError::Unauthorized {
                actor: actor.id.clone(),
                role: actor.role,
                operation: op,
            })
        }
    }
}
