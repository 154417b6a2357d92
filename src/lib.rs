//! BRT: Batch Release Toolkit
//!
//! Batch manufacturing lifecycle, deviation ledger and QA release gate for
//! regulated production, with a hash-chained audit trail and a command-line
//! front end over a plain-text plant state file.

pub mod cli;
pub mod core;
pub mod entities;
