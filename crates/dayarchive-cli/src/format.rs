//! Output formatting for archivectl
//!
//! Supports two output formats:
//! - Table: ASCII tables with rounded borders (default)
//! - JSON: Machine-readable JSON

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::*;
use dayarchive_metadata::{DayArchive, Platform};
use dayarchive_storage::{ScopeEntry, StageReport};
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// One tracking row as shown to operators.
#[derive(Debug, Serialize, Tabled)]
pub struct ArchiveRow {
    pub id: i64,
    pub date: String,
    pub slug: String,
    pub variant: String,
    pub total: u64,
    #[tabled(rename = "size")]
    pub archive_size: String,
    #[tabled(rename = "completed")]
    pub completed_at: String,
    pub file: String,
}

impl From<&DayArchive> for ArchiveRow {
    fn from(archive: &DayArchive) -> Self {
        Self {
            id: archive.id,
            date: archive.date.to_string(),
            slug: archive.slug.clone(),
            variant: archive.variant.to_string(),
            total: archive.total,
            archive_size: archive
                .archive_size
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            completed_at: archive
                .completed_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            file: archive
                .archive_path
                .clone()
                .or_else(|| archive.raw_path.clone())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct ScopeRow {
    pub scope: String,
    pub slug: String,
}

impl From<&ScopeEntry> for ScopeRow {
    fn from(entry: &ScopeEntry) -> Self {
        Self {
            scope: entry.scope.key(),
            slug: entry.slug.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PlatformRow {
    pub id: i64,
    pub name: String,
    pub uuid: String,
}

impl From<&Platform> for PlatformRow {
    fn from(platform: &Platform) -> Self {
        Self {
            id: platform.id,
            name: platform.name.clone(),
            uuid: platform.uuid.clone(),
        }
    }
}

/// One job outcome of a stage.
#[derive(Debug, Serialize, Tabled)]
pub struct OutcomeRow {
    pub stage: String,
    pub archive: i64,
    pub outcome: String,
    pub detail: String,
}

fn outcome_rows(report: &StageReport) -> Vec<OutcomeRow> {
    let skipped = report.skipped.iter().map(|s| OutcomeRow {
        stage: report.stage.to_string(),
        archive: s.archive_id,
        outcome: "skipped".to_string(),
        detail: format!("{} {}: {}", s.slug, s.variant, s.reason),
    });
    let failed = report.failed.iter().map(|f| OutcomeRow {
        stage: report.stage.to_string(),
        archive: f.archive_id,
        outcome: if f.retryable { "failed (retryable)" } else { "failed" }.to_string(),
        detail: format!("{} {}: {}", f.slug, f.variant, f.error),
    });
    skipped.chain(failed).collect()
}

pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn print_list<T: Serialize + Tabled>(&self, items: Vec<T>) -> Result<()> {
        match self.format {
            OutputFormat::Table => self.print_table(items),
            OutputFormat::Json => self.print_json(&items),
        }
    }

    /// Print a stage summary, then every job that did not succeed.
    pub fn print_report(&self, report: &StageReport) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.print_json(report);
        }

        let summary = format!(
            "{}: {} succeeded, {} skipped, {} failed",
            report.stage,
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        if report.is_success() {
            self.print_success(&summary);
        } else {
            self.print_error(&summary);
        }

        let rows = outcome_rows(report);
        if !rows.is_empty() {
            self.print_table(rows)?;
        }
        Ok(())
    }

    pub fn print_success(&self, message: &str) {
        if self.colored {
            println!("{} {}", "✅".green(), message);
        } else {
            println!("✅ {}", message);
        }
    }

    pub fn print_error(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "❌".red(), message);
        } else {
            eprintln!("❌ {}", message);
        }
    }

    fn print_table<T: Tabled>(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            println!("No items found");
            return Ok(());
        }

        let mut table = Table::new(items);
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        println!("{}", table);
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, items: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        println!("{}", json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dayarchive_core::{Scope, Variant};
    use dayarchive_metadata::DayRange;

    fn archive(completed_at: Option<i64>) -> DayArchive {
        DayArchive {
            id: 3,
            date: NaiveDate::from_ymd_opt(2023, 8, 8).unwrap(),
            scope: Scope::Global,
            variant: Variant::Light,
            slug: "global".to_string(),
            total: 12,
            range: DayRange::new(1, 12),
            raw_path: Some("sor-global-2023-08-08-light.csv".to_string()),
            archive_path: completed_at.map(|_| "sor-global-2023-08-08-light.csv.zip".to_string()),
            checksum_path: None,
            archive_size: completed_at.map(|_| 512),
            checksum: None,
            completed_at,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_archive_row_pending() {
        let row = ArchiveRow::from(&archive(None));
        assert_eq!(row.completed_at, "-");
        assert_eq!(row.archive_size, "-");
        assert_eq!(row.file, "sor-global-2023-08-08-light.csv");
        assert_eq!(row.variant, "light");
    }

    #[test]
    fn test_archive_row_completed() {
        let row = ArchiveRow::from(&archive(Some(1_691_539_200_000)));
        assert_eq!(row.completed_at, "2023-08-09 00:00:00");
        assert_eq!(row.archive_size, "512");
        assert_eq!(row.file, "sor-global-2023-08-08-light.csv.zip");
    }

    #[test]
    fn test_print_formats() {
        let rows = vec![ArchiveRow::from(&archive(None))];
        Formatter::new(OutputFormat::Table, false).print_list(rows).unwrap();

        let rows = vec![ArchiveRow::from(&archive(Some(0)))];
        Formatter::new(OutputFormat::Json, false).print_list(rows).unwrap();

        let report = StageReport::new("publish");
        Formatter::new(OutputFormat::Table, false)
            .print_report(&report)
            .unwrap();
    }
}
