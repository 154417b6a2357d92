//! CLI command implementations

pub mod audit;
pub mod batch;
pub mod bmr;
pub mod completions;
pub mod dev;
pub mod init;
pub mod release;
pub mod status;
