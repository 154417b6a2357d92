//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::OutputFormat;
use crate::core::audit::AuditEntry;
use crate::core::workflow::Outcome;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_list: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_list {
                OutputFormat::Table
            } else {
                OutputFormat::Auto
            }
        }
        other => other,
    }
}

/// Print a value as YAML or JSON; returns false for the other formats
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Render rows as a rounded table
pub fn print_table<R: Tabled>(rows: Vec<R>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

/// Print the result of a mutating command
///
/// Structured formats print the aggregate with its audit entry; the human
/// format prints the recorded transition.
pub fn print_outcome<T: Serialize>(
    outcome: &Outcome<T>,
    format: OutputFormat,
    entity_label: &str,
) -> Result<()> {
    if print_structured(outcome, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        println!("{}", outcome.audit.entity);
        return Ok(());
    }
    print_transition(&outcome.audit, entity_label);
    Ok(())
}

fn print_transition(entry: &AuditEntry, entity_label: &str) {
    let change = if entry.from == entry.to {
        style(entry.to.clone()).cyan().to_string()
    } else {
        format!(
            "{} → {}",
            style(&entry.from).dim(),
            style(&entry.to).cyan()
        )
    };
    println!(
        "{} {} {} ({})",
        style("✓").green(),
        style(entry.action.replace('_', " ")).bold(),
        style(entity_label).yellow(),
        change
    );
    if let Some(detail) = &entry.detail {
        println!("   {}", style(detail).dim());
    }
}
