//! Filter enums shared by list commands
//!
//! Each filter converts into the optional field of a core query filter.

use clap::ValueEnum;

use crate::entities::batch::{BatchStatus, QaReleaseStatus};
use crate::entities::deviation::{DeviationStatus, Severity};

/// Batch status filter
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum BatchStatusFilter {
    Planned,
    InProgress,
    QcReview,
    Completed,
    OnHold,
    Delayed,
    Blocked,
    /// Every status - default
    #[default]
    All,
}

impl BatchStatusFilter {
    pub fn status(&self) -> Option<BatchStatus> {
        match self {
            BatchStatusFilter::Planned => Some(BatchStatus::Planned),
            BatchStatusFilter::InProgress => Some(BatchStatus::InProgress),
            BatchStatusFilter::QcReview => Some(BatchStatus::QcReview),
            BatchStatusFilter::Completed => Some(BatchStatus::Completed),
            BatchStatusFilter::OnHold => Some(BatchStatus::OnHold),
            BatchStatusFilter::Delayed => Some(BatchStatus::Delayed),
            BatchStatusFilter::Blocked => Some(BatchStatus::Blocked),
            BatchStatusFilter::All => None,
        }
    }
}

/// QA release status filter
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ReleaseFilter {
    Pending,
    Hold,
    Released,
    Rejected,
    #[default]
    All,
}

impl ReleaseFilter {
    pub fn status(&self) -> Option<QaReleaseStatus> {
        match self {
            ReleaseFilter::Pending => Some(QaReleaseStatus::Pending),
            ReleaseFilter::Hold => Some(QaReleaseStatus::Hold),
            ReleaseFilter::Released => Some(QaReleaseStatus::Released),
            ReleaseFilter::Rejected => Some(QaReleaseStatus::Rejected),
            ReleaseFilter::All => None,
        }
    }
}

/// Deviation status filter
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum DeviationStatusFilter {
    Open,
    Investigation,
    PendingManagerReview,
    PendingFinalApproval,
    Closed,
    Rejected,
    /// Anything not closed or rejected
    Active,
    /// Every status - default
    #[default]
    All,
}

impl DeviationStatusFilter {
    pub fn status(&self) -> Option<DeviationStatus> {
        match self {
            DeviationStatusFilter::Open => Some(DeviationStatus::Open),
            DeviationStatusFilter::Investigation => Some(DeviationStatus::Investigation),
            DeviationStatusFilter::PendingManagerReview => {
                Some(DeviationStatus::PendingManagerReview)
            }
            DeviationStatusFilter::PendingFinalApproval => {
                Some(DeviationStatus::PendingFinalApproval)
            }
            DeviationStatusFilter::Closed => Some(DeviationStatus::Closed),
            DeviationStatusFilter::Rejected => Some(DeviationStatus::Rejected),
            DeviationStatusFilter::Active | DeviationStatusFilter::All => None,
        }
    }

    pub fn open_only(&self) -> bool {
        *self == DeviationStatusFilter::Active
    }
}

/// Minimum severity filter
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum SeverityFilter {
    Low,
    Medium,
    High,
    Critical,
    /// High and critical only
    Urgent,
    /// All severities - default
    #[default]
    All,
}

impl SeverityFilter {
    /// Lowest severity admitted by this filter
    pub fn min_severity(&self) -> Option<Severity> {
        match self {
            SeverityFilter::Low | SeverityFilter::All => None,
            SeverityFilter::Medium => Some(Severity::Medium),
            SeverityFilter::High | SeverityFilter::Urgent => Some(Severity::High),
            SeverityFilter::Critical => Some(Severity::Critical),
        }
    }
}
