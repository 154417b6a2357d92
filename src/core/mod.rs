//! Core module - engine, state machines and supporting types

pub mod audit;
pub mod config;
pub mod identity;
pub mod ledger;
pub mod manufacturing;
pub mod query;
pub mod release;
pub mod store;
pub mod team;
pub mod workflow;

pub use audit::{AuditEntry, AuditError, AuditTrail, Transition};
pub use config::{Config, ConfigError};
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use ledger::Investigation;
pub use manufacturing::StepUpdate;
pub use query::{BatchFilter, Dashboard, DeviationFilter};
pub use release::{FailedCheck, GateCheck, ReleaseDecision};
pub use store::{Snapshot, Store};
pub use team::{Actor, Operation, Policy, PolicyConfig, Role};
pub use workflow::{ErrorKind, NewDeviation, Outcome, WorkflowEngine, WorkflowError};
