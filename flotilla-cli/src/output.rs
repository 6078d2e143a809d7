//! Table and JSON rendering of command results.

use clap::ValueEnum;
use flotilla_core::drift::FieldDrift;
use flotilla_core::{PlanEntry, ReconcileError, ReconciliationResult, ResourceId};
use serde_json::{Value, json};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "RESOURCE")]
    resource: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "RESULT")]
    result: String,
    #[tabled(rename = "RETRIES")]
    retries: usize,
    #[tabled(rename = "ERROR")]
    error: String,
}

impl From<&ReconciliationResult> for ResultRow {
    fn from(r: &ReconciliationResult) -> Self {
        Self {
            resource: r.id.to_string(),
            action: r.action.to_string(),
            state: r.state.to_string(),
            result: if r.success { "ok" } else { "failed" }.to_string(),
            retries: r.retries.len(),
            error: r.error.as_ref().map_or_else(|| "-".to_string(), |e| e.to_string()),
        }
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "RESOURCE")]
    resource: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "CHANGES")]
    changes: String,
}

/// Plan outcome for one descriptor.
pub type PlanLine = Result<PlanEntry, (ResourceId, ReconcileError)>;

pub fn print_results(results: &[ReconciliationResult], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Table if results.is_empty() => println!("No resources"),
        OutputFormat::Table => {
            let rows: Vec<ResultRow> = results.iter().map(ResultRow::from).collect();
            println!("{}", Table::new(rows));
            let failed = results.iter().filter(|r| !r.success).count();
            println!("{} succeeded, {} failed", results.len() - failed, failed);
        }
    }
    Ok(())
}

pub fn print_plan(lines: &[PlanLine], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let entries: Vec<Value> = lines
                .iter()
                .map(|line| match line {
                    Ok(entry) => serde_json::to_value(entry),
                    Err((id, e)) => Ok(json!({"id": id, "error": e.to_string()})),
                })
                .collect::<Result<_, _>>()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Table if lines.is_empty() => println!("No resources"),
        OutputFormat::Table => {
            let rows: Vec<PlanRow> = lines
                .iter()
                .map(|line| match line {
                    Ok(entry) => PlanRow {
                        resource: entry.id.to_string(),
                        action: entry.action.to_string(),
                        changes: describe_changes(&entry.drift),
                    },
                    Err((id, e)) => PlanRow {
                        resource: id.to_string(),
                        action: "error".to_string(),
                        changes: e.to_string(),
                    },
                })
                .collect();
            println!("{}", Table::new(rows));
        }
    }
    Ok(())
}

fn describe_changes(drift: &[FieldDrift]) -> String {
    if drift.is_empty() {
        return "-".to_string();
    }
    drift
        .iter()
        .map(|d| match &d.observed {
            Some(observed) => format!("{}: {} -> {}", d.wire_name, observed, d.declared),
            None => format!("{}: {}", d.wire_name, d.declared),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
