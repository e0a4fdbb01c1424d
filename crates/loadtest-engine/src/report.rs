//! Final report and its renderings.

use crate::config::{DispatchStrategy, RunMode};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use ledger_client::TrackingMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output format for the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Table,
    Json,
}

/// Configuration block echoed at the top of every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescription {
    pub mode: RunMode,
    pub total_transactions: u64,
    pub workers: usize,
    pub event_batch_size: usize,
    pub backend: String,
    pub tracking: TrackingMode,
    pub dispatch: DispatchStrategy,
}

/// How submissions and confirmations were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostics {
    /// Submit calls made.
    pub submitted: u64,
    /// Submit calls the backend rejected.
    pub rejected: u64,
    pub duplicates: u64,
    pub unmatched: u64,
    pub malformed: u64,
    pub query_errors: u64,
    pub poll_sweeps: u32,
    pub idle_sweeps: u32,
}

impl Diagnostics {
    /// Confirmations that were received but not used.
    pub fn discarded(&self) -> u64 {
        self.duplicates + self.unmatched + self.malformed
    }
}

/// Read-only summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run: RunDescription,
    pub runtime_secs: f64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Longest single-item elapsed time.
    pub max_elapsed_secs: f64,
    pub mean_elapsed_secs: f64,
    /// Requested transactions per second of runtime.
    pub throughput: f64,
    /// First few distinct error messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_samples: Vec<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn completed(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    /// Whether every requested transaction succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.successes == self.run.total_transactions
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::write(path, format_json(self)?)?;
        Ok(())
    }

    /// Read a report written by [`Report::save`].
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Transactions per second, zero for a zero-length run.
pub fn throughput(requested: u64, runtime_secs: f64) -> f64 {
    if runtime_secs > 0.0 {
        requested as f64 / runtime_secs
    } else {
        0.0
    }
}

/// Render a report in the given format.
pub fn render(report: &Report, format: OutputFormat) -> Result<String, EngineError> {
    match format {
        OutputFormat::Text => Ok(format_text(report)),
        OutputFormat::Table => Ok(format_table(report)),
        OutputFormat::Json => format_json(report),
    }
}

/// Line-oriented summary.
pub fn format_text(report: &Report) -> String {
    let run = &report.run;
    let mut output = String::new();

    output.push_str("Final Report\n");
    output.push_str("  - Configuration:\n");
    output.push_str(&format!("    * mode: {}\n", run.mode));
    output.push_str(&format!(
        "    * total transactions: {}\n",
        run.total_transactions
    ));
    output.push_str(&format!("    * workers count: {}\n", run.workers));
    output.push_str(&format!("    * event batch size: {}\n", run.event_batch_size));
    output.push_str(&format!("    * backend: {}\n", run.backend));
    output.push_str(&format!("    * tracking: {}\n", run.tracking));
    output.push_str(&format!("    * dispatch: {}\n", run.dispatch));
    output.push_str(&format!(
        "  - Total program runtime: {}\n",
        format_duration(report.runtime_secs)
    ));
    output.push_str(&format!("  - Successes: {}\n", report.successes));
    output.push_str(&format!("  - Failures: {}\n", report.failures));
    output.push_str(&format!("  - Timeouts: {}\n", report.timeouts));
    output.push_str(&format!(
        "  - Max elapsed: {}\n",
        format_duration(report.max_elapsed_secs)
    ));
    output.push_str(&format!(
        "  - Mean elapsed: {}\n",
        format_duration(report.mean_elapsed_secs)
    ));
    output.push_str(&format!("  - TPS: {:.3}\n", report.throughput));

    let diagnostics = &report.diagnostics;
    if diagnostics.poll_sweeps > 0 {
        output.push_str(&format!(
            "  - Receipt sweeps: {} ({} idle)\n",
            diagnostics.poll_sweeps, diagnostics.idle_sweeps
        ));
    }
    if diagnostics.discarded() > 0 {
        output.push_str(&format!(
            "  - Discarded confirmations: {} duplicate, {} unmatched, {} malformed\n",
            diagnostics.duplicates, diagnostics.unmatched, diagnostics.malformed
        ));
    }

    if !report.error_samples.is_empty() {
        output.push_str("  - Errors:\n");
        for error in &report.error_samples {
            output.push_str(&format!("    * {error}\n"));
        }
    }

    output
}

/// Table summary.
pub fn format_table(report: &Report) -> String {
    let run = &report.run;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Transactions",
        "Workers",
        "Backend",
        "Runtime",
        "Success",
        "Failure",
        "Timeout",
        "Max elapsed",
        "TPS",
    ]);

    let count_cell = |n: u64, color: Color| {
        if n > 0 {
            Cell::new(format_number(n)).fg(color)
        } else {
            Cell::new("0")
        }
    };

    table.add_row(vec![
        Cell::new(format_number(run.total_transactions)),
        Cell::new(run.workers),
        Cell::new(format!("{} ({})", run.backend, run.tracking)),
        Cell::new(format_duration(report.runtime_secs)),
        count_cell(report.successes, Color::Green),
        count_cell(report.failures, Color::Red),
        count_cell(report.timeouts, Color::Yellow),
        Cell::new(format_duration(report.max_elapsed_secs)),
        Cell::new(format!("{:.1}", report.throughput)),
    ]);

    let mut output = table.to_string();
    output.push('\n');
    if !report.error_samples.is_empty() {
        output.push_str("\nErrors:\n");
        for error in &report.error_samples {
            output.push_str(&format!("  {error}\n"));
        }
    }
    output
}

pub fn format_json(report: &Report) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Format duration in human-readable format.
pub fn format_duration(secs: f64) -> String {
    // Round to each unit's precision before picking the unit.
    let millis = (secs * 1000.0).round();
    if millis < 1000.0 {
        return format!("{millis:.0}ms");
    }
    let tenths = (secs * 10.0).round();
    if tenths < 600.0 {
        return format!("{:.1}s", tenths / 10.0);
    }
    let whole = secs.round() as u64;
    if whole < 3600 {
        format!("{}m {:02}s", whole / 60, whole % 60)
    } else {
        format!("{}h {:02}m", whole / 3600, (whole % 3600) / 60)
    }
}

/// Format number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
