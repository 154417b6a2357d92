//! Entity type definitions

pub mod batch;
pub mod deviation;

pub use batch::{
    Batch, BatchPlan, BatchStatus, BmrStatus, BmrStep, ESignature, HoldKind, QaReleaseStatus,
    QcDependence, Stage, StagePlan, StageStatus, Step, StepKind, StepPlan, StepStatus, Unit,
};
pub use deviation::{Department, Deviation, DeviationStatus, Severity};
