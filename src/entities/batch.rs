//! Production batch entity
//!
//! A batch is the unit of manufacture and of QA release. It owns an ordered
//! list of stages (each an ordered list of SOP steps) and the batch
//! manufacturing record (BMR) checklist that QA verifies before release.
//!
//! The overall status is never written directly by callers. It is derived
//! from stage state plus the active side-branch (hold, delay or block); see
//! [`Batch::refresh_status`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::identity::{EntityId, EntityPrefix};

/// Overall batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Planned,
    InProgress,
    QcReview,
    Completed,
    OnHold,
    Delayed,
    Blocked,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Planned => "planned",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::QcReview => "qc_review",
            BatchStatus::Completed => "completed",
            BatchStatus::OnHold => "on_hold",
            BatchStatus::Delayed => "delayed",
            BatchStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "planned" => Ok(BatchStatus::Planned),
            "in_progress" | "running" => Ok(BatchStatus::InProgress),
            "qc_review" => Ok(BatchStatus::QcReview),
            "completed" | "complete" => Ok(BatchStatus::Completed),
            "on_hold" | "hold" => Ok(BatchStatus::OnHold),
            "delayed" => Ok(BatchStatus::Delayed),
            "blocked" => Ok(BatchStatus::Blocked),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

/// QA release decision for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QaReleaseStatus {
    #[default]
    Pending,
    Hold,
    Released,
    Rejected,
}

impl QaReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QaReleaseStatus::Pending => "pending",
            QaReleaseStatus::Hold => "hold",
            QaReleaseStatus::Released => "released",
            QaReleaseStatus::Rejected => "rejected",
        }
    }

    /// Released and rejected batches accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, QaReleaseStatus::Released | QaReleaseStatus::Rejected)
    }
}

impl std::fmt::Display for QaReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the batch still depends on a QC outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QcDependence {
    PendingQc,
    PassedQc,
    FailedQc,
    #[default]
    NotApplicable,
}

impl QcDependence {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcDependence::PendingQc => "pending_qc",
            QcDependence::PassedQc => "passed_qc",
            QcDependence::FailedQc => "failed_qc",
            QcDependence::NotApplicable => "n/a",
        }
    }
}

impl std::fmt::Display for QcDependence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QcDependence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "pending" | "pending_qc" => Ok(QcDependence::PendingQc),
            "passed" | "pass" | "passed_qc" => Ok(QcDependence::PassedQc),
            "failed" | "fail" | "failed_qc" => Ok(QcDependence::FailedQc),
            "n/a" | "na" | "not_applicable" => Ok(QcDependence::NotApplicable),
            _ => Err(format!("Unknown QC dependence status: {}", s)),
        }
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Running,
    QaHold,
    QcHold,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Running => "running",
            StageStatus::QaHold => "qa_hold",
            StageStatus::QcHold => "qc_hold",
            StageStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SOP step type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    DataEntry,
    Confirmation,
    Timer,
    QcSample,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::DataEntry => write!(f, "data_entry"),
            StepKind::Confirmation => write!(f, "confirmation"),
            StepKind::Timer => write!(f, "timer"),
            StepKind::QcSample => write!(f, "qc_sample"),
        }
    }
}

/// SOP step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    RequiresApproval,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::RequiresApproval => "requires_approval",
            StepStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" | "started" => Ok(StepStatus::InProgress),
            "completed" | "complete" | "done" => Ok(StepStatus::Completed),
            "requires_approval" | "approval" => Ok(StepStatus::RequiresApproval),
            "rejected" => Ok(StepStatus::Rejected),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// BMR checklist item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BmrStatus {
    Missing,
    #[default]
    Pending,
    Clarification,
    Verified,
}

impl BmrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmrStatus::Missing => "missing",
            BmrStatus::Pending => "pending",
            BmrStatus::Clarification => "clarification",
            BmrStatus::Verified => "verified",
        }
    }
}

impl std::fmt::Display for BmrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BmrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "missing" => Ok(BmrStatus::Missing),
            "pending" => Ok(BmrStatus::Pending),
            "clarification" | "clarify" => Ok(BmrStatus::Clarification),
            "verified" | "verify" => Ok(BmrStatus::Verified),
            _ => Err(format!("Unknown BMR status: {}", s)),
        }
    }
}

/// Unit of measure for batch quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Unit {
    #[default]
    #[serde(rename = "kg")]
    Kg,
    #[serde(rename = "L")]
    L,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Kg => write!(f, "kg"),
            Unit::L => write!(f, "L"),
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kg" | "KG" | "Kg" => Ok(Unit::Kg),
            "L" | "l" => Ok(Unit::L),
            _ => Err(format!("Unknown unit: {}", s)),
        }
    }
}

/// Which function placed a hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HoldKind {
    #[default]
    Qa,
    Qc,
}

impl HoldKind {
    /// Stage status a running stage takes while this hold is active
    pub fn stage_status(&self) -> StageStatus {
        match self {
            HoldKind::Qa => StageStatus::QaHold,
            HoldKind::Qc => StageStatus::QcHold,
        }
    }
}

impl std::fmt::Display for HoldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldKind::Qa => write!(f, "qa"),
            HoldKind::Qc => write!(f, "qc"),
        }
    }
}

impl FromStr for HoldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qa" => Ok(HoldKind::Qa),
            "qc" => Ok(HoldKind::Qc),
            _ => Err(format!("Unknown hold kind: {}", s)),
        }
    }
}

/// Electronic signature captured when completing a signature-gated step
///
/// The signer's identity, the meaning of the signature and the timestamp
/// together constitute the signature record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ESignature {
    pub signer: String,
    /// What the signature attests to, e.g. "performed" or "verified"
    pub meaning: String,
    pub timestamp: DateTime<Utc>,
}

impl ESignature {
    pub fn new(signer: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            signer: signer.into(),
            meaning: meaning.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A single SOP step within a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    /// Recorded value for data-entry steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub requires_esig: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ESignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Step {
    /// Anything short of completed keeps the stage open
    pub fn is_resolved(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// A manufacturing stage (e.g. Dispensing, Reaction, Drying)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer: Option<String>,
    /// Informational progress, 0-100
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

impl Stage {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Steps that prevent the stage from completing
    pub fn unresolved_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| !s.is_resolved()).collect()
    }
}

/// A BMR checklist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmrStep {
    pub name: String,
    #[serde(default)]
    pub status: BmrStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
}

/// Active hold on a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub kind: HoldKind,
    pub placed_by: String,
    pub placed_at: DateTime<Utc>,
}

/// A production batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier (BAT-ULID)
    pub id: EntityId,

    /// Plant-facing batch number, unique across the store (e.g. "AP-PARA-001")
    pub batch_number: String,

    /// Product being manufactured
    pub product: String,

    /// Owning plant
    pub plant: String,

    pub quantity: f64,

    #[serde(default)]
    pub unit: Unit,

    /// Derived overall status; see `refresh_status`
    #[serde(default)]
    pub status: BatchStatus,

    /// Ordered manufacturing stages
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// BMR checklist
    #[serde(default)]
    pub bmr: Vec<BmrStep>,

    #[serde(default)]
    pub qa_release_status: QaReleaseStatus,

    #[serde(default)]
    pub qc_dependence: QcDependence,

    /// Final yield in percent, recorded after the last stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_yield: Option<f64>,

    /// Reason for the current hold, or for QA rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<Hold>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    /// Production manager responsible for the batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Lead production officer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_officer: Option<String>,

    pub created: DateTime<Utc>,

    pub author: String,

    #[serde(default = "default_revision")]
    pub revision: u32,
}

fn default_revision() -> u32 {
    1
}

impl Batch {
    /// Build a planned batch from a production plan
    pub fn from_plan(plan: BatchPlan, author: String) -> Self {
        let stages = plan
            .stages
            .into_iter()
            .map(|s| Stage {
                name: s.name,
                status: StageStatus::NotStarted,
                officer: s.officer,
                progress: 0,
                steps: s
                    .steps
                    .into_iter()
                    .map(|st| Step {
                        id: st.id,
                        name: st.name,
                        kind: st.kind,
                        status: StepStatus::Pending,
                        instructions: st.instructions,
                        value: None,
                        requires_esig: st.requires_esig,
                        signature: None,
                        updated_by: None,
                    })
                    .collect(),
            })
            .collect();

        let bmr = plan
            .bmr
            .into_iter()
            .map(|name| BmrStep {
                name,
                status: BmrStatus::Pending,
                note: None,
                verified_by: None,
            })
            .collect();

        Self {
            id: EntityId::new(EntityPrefix::Bat),
            batch_number: plan.batch_number,
            product: plan.product,
            plant: plan.plant,
            quantity: plan.quantity,
            unit: plan.unit,
            status: BatchStatus::Planned,
            stages,
            bmr,
            qa_release_status: QaReleaseStatus::Pending,
            qc_dependence: plan.qc_dependence,
            final_yield: None,
            hold_reason: None,
            hold: None,
            delay_reason: None,
            block_reason: None,
            start_date: None,
            end_date: None,
            assigned_to: plan.assigned_to,
            officer: plan.officer,
            qa_officer: plan.qa_officer,
            created: Utc::now(),
            author,
            revision: 1,
        }
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn all_stages_completed(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status == StageStatus::Completed)
    }

    /// Release decision is final
    pub fn is_terminal(&self) -> bool {
        self.qa_release_status.is_terminal()
    }

    /// The stage currently being worked, if any
    pub fn active_stage(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| {
            matches!(
                s.status,
                StageStatus::Running | StageStatus::QaHold | StageStatus::QcHold
            )
        })
    }

    /// Status implied by stage state and the QC dependency alone
    pub fn derived_status(&self) -> BatchStatus {
        if self.stages.is_empty()
            || self
                .stages
                .iter()
                .all(|s| s.status == StageStatus::NotStarted)
        {
            BatchStatus::Planned
        } else if self.all_stages_completed() {
            if self.qc_dependence == QcDependence::PassedQc {
                BatchStatus::Completed
            } else {
                BatchStatus::QcReview
            }
        } else {
            BatchStatus::InProgress
        }
    }

    /// Recompute the overall status from stage state and side-branches
    ///
    /// Blocked takes precedence over a hold, which takes precedence over a
    /// delay. With no side-branch active the derived status applies.
    pub fn refresh_status(&mut self) {
        self.status = if self.block_reason.is_some() {
            BatchStatus::Blocked
        } else if self.hold.is_some() {
            BatchStatus::OnHold
        } else if self.delay_reason.is_some() {
            BatchStatus::Delayed
        } else {
            self.derived_status()
        };
    }

    /// Count of verified BMR items
    pub fn bmr_verified(&self) -> usize {
        self.bmr
            .iter()
            .filter(|s| s.status == BmrStatus::Verified)
            .count()
    }
}

/// Production plan used to create a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_number: String,
    pub product: String,
    pub plant: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub stages: Vec<StagePlan>,
    /// BMR checklist item names
    #[serde(default)]
    pub bmr: Vec<String>,
    #[serde(default)]
    pub qc_dependence: QcDependence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_officer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePlan {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officer: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub requires_esig: bool,
}

impl BatchPlan {
    /// Plan with named stages and BMR items and no SOP steps
    pub fn simple(
        batch_number: impl Into<String>,
        product: impl Into<String>,
        stages: &[&str],
        bmr: &[&str],
    ) -> Self {
        Self {
            batch_number: batch_number.into(),
            product: product.into(),
            plant: "plant-a".to_string(),
            quantity: 500.0,
            unit: Unit::Kg,
            stages: stages
                .iter()
                .map(|name| StagePlan {
                    name: name.to_string(),
                    officer: None,
                    steps: Vec::new(),
                })
                .collect(),
            bmr: bmr.iter().map(|s| s.to_string()).collect(),
            qc_dependence: QcDependence::NotApplicable,
            assigned_to: None,
            officer: None,
            qa_officer: None,
        }
    }
}
