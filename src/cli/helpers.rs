//! Shared helper functions for CLI commands
//!
//! This module contains utility functions that are used across multiple
//! command modules to avoid code duplication.

use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{bail, IntoDiagnostic, Result};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::output::print_outcome;
use crate::cli::GlobalOpts;
use crate::core::identity::EntityId;
use crate::core::store::Snapshot;
use crate::core::team::{Actor, Role};
use crate::core::workflow::{Outcome, WorkflowEngine, WorkflowError};
use crate::core::Config;
use crate::entities::batch::Batch;
use crate::entities::deviation::Deviation;

/// Truncate a string to max_len, adding "..." if truncated
///
/// Useful for table columns that need fixed-width output.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Render an optional value, using "-" for missing
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

/// Ask for confirmation unless `yes` is set
///
/// Refuses outright when stdin is not a terminal, so scripted callers must
/// pass `--yes` explicitly.
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        bail!("Refusing to continue without confirmation. Pass --yes to proceed non-interactively");
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

/// A loaded plant: configuration, engine and where to save it
pub struct Session {
    pub engine: WorkflowEngine,
    config: Config,
    state_path: PathBuf,
    actor: Option<String>,
    role: Option<Role>,
}

impl Session {
    /// Load configuration and the plant state file
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let config = Config::load().into_diagnostic()?;
        let state_path = resolve_state_path(global, &config);
        if !state_path.exists() {
            bail!(
                "No plant state at {}\nRun 'brt init' to create one, or pass --state <FILE>",
                state_path.display()
            );
        }
        let snapshot = Snapshot::load(&state_path)?;
        let engine = WorkflowEngine::from_snapshot(snapshot, config.policy())?;
        debug!(state = %state_path.display(), "plant state loaded");

        Ok(Self {
            engine,
            actor: global.actor.clone().or_else(|| config.actor.clone()),
            role: global.role.or(config.role),
            config,
            state_path,
        })
    }

    /// The acting user for mutating commands
    pub fn actor(&self) -> Result<Actor> {
        match (&self.actor, self.role) {
            (Some(id), Some(role)) => Ok(Actor::new(id.clone(), role)),
            (None, _) => bail!(
                "No actor set. Pass --actor <ID>, set BRT_ACTOR, or add 'actor:' to .brt/config.yaml"
            ),
            (_, None) => bail!(
                "No role set. Pass --role <ROLE>, set BRT_ROLE, or add 'role:' to .brt/config.yaml"
            ),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Persist the engine state back to the state file
    pub fn save(&self) -> Result<()> {
        self.engine.snapshot().save(&self.state_path)?;
        debug!(state = %self.state_path.display(), "plant state saved");
        Ok(())
    }
}

/// Run one batch operation as the configured actor, save, and report it
pub fn mutate_batch<F>(global: &GlobalOpts, reference: &str, op: F) -> Result<()>
where
    F: FnOnce(&WorkflowEngine, &Actor, &EntityId) -> Result<Outcome<Batch>, WorkflowError>,
{
    let session = Session::open(global)?;
    let actor = session.actor()?;
    let id = session.engine.resolve_batch(reference)?;
    let outcome = op(&session.engine, &actor, &id)?;
    session.save()?;
    print_outcome(&outcome, global.output, &outcome.aggregate.batch_number)
}

/// Run one deviation operation as the configured actor, save, and report it
pub fn mutate_deviation<F>(global: &GlobalOpts, reference: &str, op: F) -> Result<()>
where
    F: FnOnce(&WorkflowEngine, &Actor, &EntityId) -> Result<Outcome<Deviation>, WorkflowError>,
{
    let session = Session::open(global)?;
    let actor = session.actor()?;
    let id = session.engine.resolve_deviation(reference)?;
    let outcome = op(&session.engine, &actor, &id)?;
    session.save()?;
    let label = outcome.aggregate.id.to_string();
    print_outcome(&outcome, global.output, &label)
}

/// State file named by `--state`/`BRT_STATE`, else the configured one
pub fn resolve_state_path(global: &GlobalOpts, config: &Config) -> PathBuf {
    global.state.clone().unwrap_or_else(|| config.state_path())
}
