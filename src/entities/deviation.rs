//! Deviation entity - quality events linked to a batch
//!
//! A deviation records a nonconformance raised during manufacture or testing.
//! It is linked to a batch by batch number and moves through investigation,
//! manager review and final QA approval. Transition rules live in
//! `core::ledger`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::identity::{EntityId, EntityPrefix};

/// Deviation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "minor" => Ok(Severity::Low),
            "medium" | "moderate" => Ok(Severity::Medium),
            "high" | "major" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Deviation workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    #[default]
    Open,
    Investigation,
    PendingManagerReview,
    PendingFinalApproval,
    Closed,
    Rejected,
}

impl DeviationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationStatus::Open => "open",
            DeviationStatus::Investigation => "investigation",
            DeviationStatus::PendingManagerReview => "pending_manager_review",
            DeviationStatus::PendingFinalApproval => "pending_final_approval",
            DeviationStatus::Closed => "closed",
            DeviationStatus::Rejected => "rejected",
        }
    }

    /// Closed and rejected deviations are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviationStatus::Closed | DeviationStatus::Rejected)
    }

    /// Whether this deviation no longer blocks batch release
    pub fn is_resolved(&self) -> bool {
        self.is_terminal()
    }
}

impl std::fmt::Display for DeviationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "open" => Ok(DeviationStatus::Open),
            "investigation" => Ok(DeviationStatus::Investigation),
            "pending_manager_review" | "manager_review" => {
                Ok(DeviationStatus::PendingManagerReview)
            }
            "pending_final_approval" | "final_approval" => {
                Ok(DeviationStatus::PendingFinalApproval)
            }
            "closed" => Ok(DeviationStatus::Closed),
            "rejected" => Ok(DeviationStatus::Rejected),
            _ => Err(format!("Unknown deviation status: {}", s)),
        }
    }
}

/// Department that raised a deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    #[default]
    Production,
    QualityAssurance,
    QualityControl,
    SupplyChain,
    Warehouse,
    Administration,
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Department::Production => write!(f, "production"),
            Department::QualityAssurance => write!(f, "qa"),
            Department::QualityControl => write!(f, "qc"),
            Department::SupplyChain => write!(f, "scm"),
            Department::Warehouse => write!(f, "warehouse"),
            Department::Administration => write!(f, "admin"),
        }
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "production" | "prod" => Ok(Department::Production),
            "qa" | "quality_assurance" => Ok(Department::QualityAssurance),
            "qc" | "quality_control" => Ok(Department::QualityControl),
            "scm" | "supply_chain" | "procurement" => Ok(Department::SupplyChain),
            "warehouse" | "wh" => Ok(Department::Warehouse),
            "admin" | "administration" => Ok(Department::Administration),
            _ => Err(format!("Unknown department: {}", s)),
        }
    }
}

/// A quality deviation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deviation {
    /// Unique identifier (DEV-ULID)
    pub id: EntityId,

    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Batch number this deviation is linked to
    pub batch_number: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub status: DeviationStatus,

    #[serde(default)]
    pub source_dept: Department,

    pub opened_by: String,

    pub opened: DateTime<Utc>,

    /// Investigator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    /// Corrective and preventive action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capa: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_reviewed_by: Option<String>,

    /// QA Head who made the final decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    /// Reason recorded when the deviation was rejected or withdrawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    /// Number of times a manager sent the investigation back
    #[serde(default)]
    pub rework_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<DateTime<Utc>>,

    #[serde(default = "default_revision")]
    pub revision: u32,
}

fn default_revision() -> u32 {
    1
}

impl Deviation {
    /// Create a new, unassigned deviation in `Open`
    pub fn new(
        batch_number: String,
        title: String,
        severity: Severity,
        source_dept: Department,
        opened_by: String,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Dev),
            title,
            description: String::new(),
            batch_number,
            severity,
            status: DeviationStatus::Open,
            source_dept,
            opened_by,
            opened: Utc::now(),
            assigned_to: None,
            investigation_summary: None,
            root_cause: None,
            capa: None,
            manager_reviewed_by: None,
            approved_by: None,
            rejection_reason: None,
            rework_count: 0,
            closed: None,
            revision: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_deviation_is_open_and_unassigned() {
        let dev = Deviation::new(
            "AP-IBU-001".to_string(),
            "Temperature excursion".to_string(),
            Severity::High,
            Department::Production,
            "prod-op-2".to_string(),
        );
        assert_eq!(dev.status, DeviationStatus::Open);
        assert!(dev.assigned_to.is_none());
        assert!(dev.id.to_string().starts_with("DEV-"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DeviationStatus::Closed.is_terminal());
        assert!(DeviationStatus::Rejected.is_terminal());
        assert!(!DeviationStatus::PendingFinalApproval.is_terminal());
        assert!(!DeviationStatus::Open.is_resolved());
    }

    #[test]
    fn test_severity_ordering_and_parse() {
        assert!(Severity::Critical > Severity::Low);
        assert_eq!(Severity::from_str("MAJOR").unwrap(), Severity::High);
        assert!(Severity::from_str("extreme").is_err());
    }

    #[test]
    fn test_status_parse_with_spaces() {
        assert_eq!(
            DeviationStatus::from_str("Pending Manager Review").unwrap(),
            DeviationStatus::PendingManagerReview
        );
    }
}
