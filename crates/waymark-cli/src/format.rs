//! Output formatters for version listings.

use chrono::SecondsFormat;
use clap::ValueEnum;
use comfy_table::Table;
use serde::Serialize;
use waymark_core::Version;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a list of versions.
    fn format_versions(&self, versions: &[Version]) -> String;

    /// Format the details of one version.
    fn format_version(&self, version: &Version) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Versions shown by `list` without `--all`.
///
/// Unapplied versions are always shown. Applied versions are shown back to the
/// most recently locked one.
pub fn filter_listed(versions: Vec<Version>, all: bool) -> Vec<Version> {
    if all {
        return versions;
    }
    let start = versions.iter().rposition(|v| v.locked).unwrap_or(0);
    versions
        .into_iter()
        .enumerate()
        .filter(|(i, v)| *i >= start || !v.is_applied())
        .map(|(_, v)| v)
        .collect()
}

/// Status column text.
pub fn status_label(version: &Version) -> &'static str {
    if version.failed {
        "failed"
    } else if version.locked {
        "locked"
    } else if version.is_applied() {
        "ok"
    } else {
        ""
    }
}

fn applied_label(version: &Version) -> String {
    version
        .applied_at
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_versions(&self, versions: &[Version]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["id", "applied", "status"]);

        for version in versions {
            table.add_row(vec![
                version.id.to_string(),
                applied_label(version),
                status_label(version).to_string(),
            ]);
        }

        table.to_string()
    }

    fn format_version(&self, version: &Version) -> String {
        let mut output = format!("version {}:", version.id);
        if version.failed {
            output.push_str(" FAILED");
        }
        if version.locked {
            output.push_str(" Locked");
        }
        output.push_str("\nUp\n--\n");
        output.push_str(version.up.trim());
        output.push_str("\n\nDown\n----\n");
        output.push_str(version.down.trim());
        output
    }
}

#[derive(Serialize)]
struct VersionRow<'a> {
    id: i64,
    applied: Option<String>,
    status: &'a str,
}

impl<'a> From<&'a Version> for VersionRow<'a> {
    fn from(version: &'a Version) -> Self {
        Self {
            id: version.id.get(),
            applied: version
                .applied_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            status: status_label(version),
        }
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_versions(&self, versions: &[Version]) -> String {
        let rows: Vec<VersionRow<'_>> = versions.iter().map(VersionRow::from).collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_version(&self, version: &Version) -> String {
        serde_json::to_string_pretty(version).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_versions(&self, versions: &[Version]) -> String {
        let mut output = String::from("id,applied,status\n");
        for version in versions {
            output.push_str(&format!(
                "{},{},{}\n",
                version.id,
                applied_label(version),
                status_label(version)
            ));
        }
        output
    }

    fn format_version(&self, version: &Version) -> String {
        format!(
            "id,applied,status,up,down\n{},{},{},\"{}\",\"{}\"\n",
            version.id,
            applied_label(version),
            status_label(version),
            escape_csv(version.up.trim()),
            escape_csv(version.down.trim())
        )
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
