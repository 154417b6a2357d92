//! Owned aggregate store
//!
//! Batches and deviations each live behind their own `RwLock` inside an
//! `Arc`, so mutations serialize per entity while unrelated entities proceed
//! independently. The index maps are locked only long enough to clone an
//! entity handle; entity locks are never taken while an index lock is held.
//!
//! Lock order when more than one entity is involved: batch, then deviation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::audit::AuditEntry;
use crate::core::identity::EntityId;
use crate::core::workflow::WorkflowError;
use crate::entities::batch::Batch;
use crate::entities::deviation::Deviation;

/// Shared, individually locked aggregate
pub type Shared<T> = Arc<RwLock<T>>;

/// Current state file format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of the whole plant state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub deviations: Vec<Deviation>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            batches: Vec::new(),
            deviations: Vec::new(),
            audit: Vec::new(),
        }
    }
}

impl Snapshot {
    /// Load a snapshot from a YAML state file
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let contents = fs::read_to_string(path).map_err(|e| WorkflowError::Persistence {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let snapshot: Snapshot =
            serde_yml::from_str(&contents).map_err(|e| WorkflowError::Persistence {
                message: format!("cannot parse {}: {}", path.display(), e),
            })?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(WorkflowError::Persistence {
                message: format!(
                    "{} uses state format v{}, this build supports v{}",
                    path.display(),
                    snapshot.version,
                    SNAPSHOT_VERSION
                ),
            });
        }
        Ok(snapshot)
    }

    /// Write the snapshot as YAML, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<(), WorkflowError> {
        let yaml = serde_yml::to_string(self).map_err(|e| WorkflowError::Persistence {
            message: format!("cannot serialize state: {}", e),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WorkflowError::Persistence {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| WorkflowError::Persistence {
                message: format!("cannot write {}: {}", path.display(), e),
            })
    }
}

/// Repository of batches and deviations
#[derive(Default)]
pub struct Store {
    batches: RwLock<HashMap<EntityId, Shared<Batch>>>,
    batch_numbers: RwLock<HashMap<String, EntityId>>,
    deviations: RwLock<HashMap<EntityId, Shared<Deviation>>>,
    deviations_by_batch: RwLock<HashMap<String, Vec<EntityId>>>,
}

fn key(batch_number: &str) -> String {
    batch_number.to_ascii_uppercase()
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from snapshot contents
    ///
    /// A batch whose stored status disagrees with the status derived from its
    /// stages and side-branches is refused.
    pub fn from_parts(
        batches: Vec<Batch>,
        deviations: Vec<Deviation>,
    ) -> Result<Self, WorkflowError> {
        let store = Self::new();
        for batch in batches {
            let mut derived = batch.clone();
            derived.refresh_status();
            if derived.status != batch.status {
                return Err(WorkflowError::Persistence {
                    message: format!(
                        "batch {} is stored as {} but its stages give {}",
                        batch.batch_number, batch.status, derived.status
                    ),
                });
            }
            store.insert_batch(batch)?;
        }
        for dev in deviations {
            store.insert_deviation(dev);
        }
        Ok(store)
    }

    /// Add a batch; batch numbers are unique case-insensitively
    pub fn insert_batch(&self, batch: Batch) -> Result<Shared<Batch>, WorkflowError> {
        let mut numbers = self.batch_numbers.write();
        let number = key(&batch.batch_number);
        if numbers.contains_key(&number) {
            return Err(WorkflowError::InvalidTransition {
                entity: batch.batch_number.clone(),
                from: "-".to_string(),
                to: "planned".to_string(),
                detail: format!("batch number {} already exists", batch.batch_number),
            });
        }
        let id = batch.id;
        let handle = Arc::new(RwLock::new(batch));
        numbers.insert(number, id);
        self.batches.write().insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Add a deviation and index it under its batch number
    pub fn insert_deviation(&self, dev: Deviation) -> Shared<Deviation> {
        let id = dev.id;
        let number = key(&dev.batch_number);
        let handle = Arc::new(RwLock::new(dev));
        self.deviations.write().insert(id, Arc::clone(&handle));
        self.deviations_by_batch
            .write()
            .entry(number)
            .or_default()
            .push(id);
        handle
    }

    pub fn batch(&self, id: &EntityId) -> Result<Shared<Batch>, WorkflowError> {
        self.batches
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "batch".to_string(),
                id: id.to_string(),
            })
    }

    pub fn batch_id(&self, batch_number: &str) -> Option<EntityId> {
        self.batch_numbers.read().get(&key(batch_number)).copied()
    }

    pub fn deviation(&self, id: &EntityId) -> Result<Shared<Deviation>, WorkflowError> {
        self.deviations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound {
                kind: "deviation".to_string(),
                id: id.to_string(),
            })
    }

    /// Handles of every deviation linked to a batch number
    pub fn deviations_for(&self, batch_number: &str) -> Vec<Shared<Deviation>> {
        let ids = self
            .deviations_by_batch
            .read()
            .get(&key(batch_number))
            .cloned()
            .unwrap_or_default();
        let map = self.deviations.read();
        ids.iter().filter_map(|id| map.get(id).cloned()).collect()
    }

    /// Clones of every batch, in no particular order
    pub fn all_batches(&self) -> Vec<Batch> {
        let handles: Vec<Shared<Batch>> = self.batches.read().values().cloned().collect();
        handles.iter().map(|h| h.read().clone()).collect()
    }

    /// Clones of every deviation, in no particular order
    pub fn all_deviations(&self) -> Vec<Deviation> {
        let handles: Vec<Shared<Deviation>> = self.deviations.read().values().cloned().collect();
        handles.iter().map(|h| h.read().clone()).collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.read().len()
    }

    pub fn deviation_count(&self) -> usize {
        self.deviations.read().len()
    }
}
