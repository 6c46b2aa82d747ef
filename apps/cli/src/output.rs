//! Output formatting utilities

use crate::OutputFormat;
use batchfetch_types::BatchReport;
use console::style;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Print output in the specified format
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

#[derive(Tabled)]
struct ReportRow {
    identity: String,
    status: String,
    detail: String,
}

/// Print a batch outcome
pub fn print_report(report: &BatchReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            let rows = report
                .succeeded
                .iter()
                .map(|done| ReportRow {
                    identity: done.identity.clone(),
                    status: "ok".to_string(),
                    detail: done.path.clone(),
                })
                .chain(report.failed.iter().map(|e| ReportRow {
                    identity: e.identity.clone(),
                    status: format!("{:?}", e.kind),
                    detail: e.message.clone(),
                }));
            println!("{}", Table::new(rows));
            println!("{}", report);
        }
        OutputFormat::Human => {
            for done in &report.succeeded {
                println!("{} {} -> {}", style("✓").green().bold(), done.identity, style(&done.path).cyan());
            }
            for e in &report.failed {
                println!("{} {}", style("✗").red().bold(), e);
            }
            println!("{}", style(report.to_string()).bold());
        }
    }
    Ok(())
}
