//! Rendering of command results
//!
//! Renderers return strings so commands decide where output goes; tables and
//! JSON go to stdout, logs go to stderr.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use shadow_audit_common::TableRef;
use shadow_audit_core::{AuditRows, AuditState, AuditStatus, BulkOutcome, RegistryEntry};

use crate::error::Result;

const CHECK: &str = "yes";
const CROSS: &str = "no";

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn flag(value: bool) -> &'static str {
    if value {
        CHECK
    } else {
        CROSS
    }
}

fn state_cell(state: AuditState) -> Cell {
    let color = match state {
        AuditState::Active => Color::Green,
        AuditState::Removed => Color::Yellow,
        AuditState::Partial => Color::Red,
        AuditState::NoAudit => Color::Reset,
    };
    Cell::new(state).fg(color)
}

/// Status of several tables, one row each
pub fn status_table(statuses: &[(TableRef, AuditStatus)]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Table", "State", "Shadow table", "Function", "Triggers"]);

    for (name, status) in statuses {
        if !status.table_exists {
            table.add_row(vec![
                Cell::new(name),
                Cell::new("missing").fg(Color::Red),
                Cell::new(flag(status.shadow_table_exists)),
                Cell::new(flag(status.function_exists)),
                Cell::new(flag(status.triggers_exist)),
            ]);
            continue;
        }
        table.add_row(vec![
            Cell::new(name),
            state_cell(status.state()),
            Cell::new(flag(status.shadow_table_exists)),
            Cell::new(flag(status.function_exists)),
            Cell::new(flag(status.triggers_exist)),
        ]);
    }

    table.to_string()
}

/// Decrypted audit rows as a table
pub fn rows_table(rows: &AuditRows) -> String {
    let mut table = new_table();
    table.set_header(rows.labels());
    for row in &rows.rows {
        table.add_row(row.iter().map(|cell| cell.to_string()));
    }
    table.to_string()
}

/// Decrypted audit rows as a JSON array of objects keyed by column label
pub fn rows_json(rows: &AuditRows) -> Result<String> {
    let objects = rows
        .rows
        .iter()
        .map(|row| {
            rows.columns
                .iter()
                .zip(row)
                .map(|(column, cell)| -> Result<(String, serde_json::Value)> {
                    Ok((column.label.clone(), serde_json::to_value(cell)?))
                })
                .collect::<Result<serde_json::Map<_, _>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(serde_json::to_string_pretty(&objects)?)
}

pub fn registry_table(entries: &[RegistryEntry]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Table", "Key", "Active", "Created", "Updated", "Shadow table"]);

    for entry in entries {
        let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        table.add_row(vec![
            Cell::new(format!("{}.{}", entry.original_schema, entry.original_table)),
            Cell::new(&entry.key_fingerprint),
            if entry.active {
                Cell::new(CHECK).fg(Color::Green)
            } else {
                Cell::new(CROSS).fg(Color::Yellow)
            },
            Cell::new(when(entry.created_at)),
            Cell::new(when(entry.updated_at)),
            Cell::new(&entry.shadow_table),
        ]);
    }

    table.to_string()
}

/// Summary lines for a bulk operation, failures listed with their cause
pub fn outcome_summary(verb: &str, outcome: &BulkOutcome) -> String {
    let mut lines = Vec::with_capacity(outcome.failed.len() + 1);
    let headline = format!(
        "{} {} of {} tables",
        verb,
        outcome.succeeded.len(),
        outcome.total
    );
    lines.push(if outcome.is_success() {
        headline.green().bold().to_string()
    } else {
        headline.yellow().bold().to_string()
    });

    for failure in &outcome.failed {
        lines.push(format!(
            "  {} {}: {}",
            "x".red(),
            failure.table,
            failure.error
        ));
    }
    lines.join("\n")
}
