//! Append-only, hash-chained audit trail
//!
//! Every accepted transition appends one [`AuditEntry`]. Each entry carries
//! the SHA-256 of its own content chained to the previous entry's hash, so
//! editing or removing any entry in a saved state file is detectable with
//! [`AuditTrail::verify`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::team::{Actor, Role};

/// Hash used as `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A state change produced by a transition function, before attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: String,
    pub from: String,
    pub to: String,
    pub detail: Option<String>,
}

impl Transition {
    pub fn new(action: impl Into<String>, from: impl ToString, to: impl ToString) -> Self {
        Self {
            action: action.into(),
            from: from.to_string(),
            to: to.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// An immutable audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    /// Entity id the change applies to
    pub entity: String,
    pub actor: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEntry {
    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        for field in [
            self.seq.to_string().as_str(),
            self.entity.as_str(),
            self.actor.as_str(),
            self.role.as_str(),
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_str(),
            self.action.as_str(),
            self.from.as_str(),
            self.to.as_str(),
            self.detail.as_deref().unwrap_or(""),
        ] {
            hasher.update(b"|");
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Audit chain verification failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit entry #{seq} is out of sequence (expected #{expected})")]
    OutOfSequence { seq: u64, expected: u64 },

    #[error("Audit entry #{seq} does not chain to its predecessor")]
    BrokenLink { seq: u64 },

    #[error("Audit entry #{seq} content does not match its hash")]
    Tampered { seq: u64 },
}

/// Ordered list of audit entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a trail from stored entries, verifying the chain
    pub fn from_entries(entries: Vec<AuditEntry>) -> Result<Self, AuditError> {
        let trail = Self { entries };
        trail.verify()?;
        Ok(trail)
    }

    /// Append a transition on behalf of an actor
    pub fn append(&mut self, entity: &str, actor: &Actor, transition: Transition) -> AuditEntry {
        let seq = self.entries.len() as u64 + 1;
        let prev_hash = self
            .entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut entry = AuditEntry {
            seq,
            entity: entity.to_string(),
            actor: actor.id.clone(),
            role: actor.role,
            timestamp: Utc::now(),
            action: transition.action,
            from: transition.from,
            to: transition.to,
            detail: transition.detail,
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one entity, oldest first
    pub fn for_entity(&self, entity: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.entity == entity)
            .cloned()
            .collect()
    }

    /// Entries recorded by one actor, oldest first
    pub fn by_actor(&self, actor: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.actor.eq_ignore_ascii_case(actor))
            .cloned()
            .collect()
    }

    /// Check sequence numbers, hash links and entry content
    pub fn verify(&self) -> Result<(), AuditError> {
        let mut prev = GENESIS_HASH;
        for (i, entry) in self.entries.iter().enumerate() {
            let expected = i as u64 + 1;
            if entry.seq != expected {
                return Err(AuditError::OutOfSequence {
                    seq: entry.seq,
                    expected,
                });
            }
            if entry.prev_hash != prev {
                return Err(AuditError::BrokenLink { seq: entry.seq });
            }
            if entry.compute_hash() != entry.hash {
                return Err(AuditError::Tampered { seq: entry.seq });
            }
            prev = &entry.hash;
        }
        Ok(())
    }
}
