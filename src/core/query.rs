//! Read-side filters and the plant dashboard

use serde::Serialize;
use std::collections::BTreeMap;

use crate::entities::batch::{Batch, BatchStatus, QaReleaseStatus};
use crate::entities::deviation::{Deviation, DeviationStatus, Severity};

/// Batch list filter; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub status: Option<BatchStatus>,
    pub release: Option<QaReleaseStatus>,
    /// Case-insensitive substring of the product name
    pub product: Option<String>,
    pub plant: Option<String>,
    /// Only batches that are done with manufacture but not yet decided
    pub pending_release: bool,
}

impl BatchFilter {
    pub fn matches(&self, batch: &Batch) -> bool {
        if let Some(status) = self.status {
            if batch.status != status {
                return false;
            }
        }
        if let Some(release) = self.release {
            if batch.qa_release_status != release {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if !batch
                .product
                .to_lowercase()
                .contains(&product.to_lowercase())
            {
                return false;
            }
        }
        if let Some(plant) = &self.plant {
            if !batch.plant.eq_ignore_ascii_case(plant) {
                return false;
            }
        }
        if self.pending_release && !is_pending_release(batch) {
            return false;
        }
        true
    }
}

/// Completed manufacture awaiting a QA decision
pub fn is_pending_release(batch: &Batch) -> bool {
    matches!(batch.status, BatchStatus::Completed | BatchStatus::QcReview)
        && batch.qa_release_status == QaReleaseStatus::Pending
}

/// Deviation list filter; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct DeviationFilter {
    pub batch_number: Option<String>,
    pub status: Option<DeviationStatus>,
    pub min_severity: Option<Severity>,
    /// Exclude closed and rejected deviations
    pub open_only: bool,
}

impl DeviationFilter {
    pub fn matches(&self, dev: &Deviation) -> bool {
        if let Some(number) = &self.batch_number {
            if !dev.batch_number.eq_ignore_ascii_case(number) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if dev.status != status {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if dev.severity < min {
                return false;
            }
        }
        if self.open_only && dev.status.is_resolved() {
            return false;
        }
        true
    }
}

/// Plant-wide counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub total_batches: usize,
    pub batches_by_status: BTreeMap<String, usize>,
    pub pending_release: usize,
    pub released: usize,
    pub rejected: usize,
    pub open_qa_holds: usize,
    pub open_deviations: usize,
    pub open_deviations_by_severity: BTreeMap<String, usize>,
}

impl Dashboard {
    pub fn build(batches: &[Batch], deviations: &[Deviation]) -> Self {
        let mut dash = Dashboard {
            total_batches: batches.len(),
            ..Dashboard::default()
        };

        for batch in batches {
            *dash
                .batches_by_status
                .entry(batch.status.to_string())
                .or_default() += 1;
            match batch.qa_release_status {
                QaReleaseStatus::Released => dash.released += 1,
                QaReleaseStatus::Rejected => dash.rejected += 1,
                QaReleaseStatus::Hold => dash.open_qa_holds += 1,
                QaReleaseStatus::Pending => {}
            }
            if is_pending_release(batch) {
                dash.pending_release += 1;
            }
        }

        for dev in deviations.iter().filter(|d| !d.status.is_resolved()) {
            dash.open_deviations += 1;
            *dash
                .open_deviations_by_severity
                .entry(dev.severity.to_string())
                .or_default() += 1;
        }

        dash
    }
}
