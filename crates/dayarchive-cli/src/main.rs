//! Day Archive CLI (archivectl)
//!
//! Operator tool for the day archive pipeline.
//!
//! ## Overview
//!
//! `archivectl` triggers the pipeline stages for one day and inspects the
//! resulting archives:
//! - **run**: build the job matrix of a closed day, write and finalize it
//! - **resume**: re-run writing and finalizing for the incomplete jobs of a day
//! - **publish**: verify checksums and upload completed archives
//! - **cleanup-raw / cleanup-archive**: reclaim staging disk
//! - **discard**: drop an unfinished day so it can be rebuilt
//! - **list / scopes / platforms**: inspect state
//!
//! ## Quick Start
//!
//! ```bash
//! export DAYARCHIVE_DB=./data/archive.db
//! export DAYARCHIVE_PUBLIC_DIR=./data/public
//!
//! # Archive yesterday, publish it, then clean up
//! archivectl run
//! archivectl publish
//! archivectl cleanup-raw
//! archivectl cleanup-archive
//!
//! # Inspect a specific day
//! archivectl list --date 2023-08-08
//! archivectl list --global
//! ```
//!
//! ## Configuration
//!
//! An optional TOML file (`--config`, `DAYARCHIVE_CONFIG`) provides defaults;
//! flags and environment variables override it:
//! - `DAYARCHIVE_DB`: SQLite database path
//! - `DAYARCHIVE_STAGING`: staging directory for raw, zip and checksum files
//! - `DAYARCHIVE_PUBLIC_DIR`: publish to a local directory
//! - `DAYARCHIVE_BUCKET`: publish to an S3 bucket (credentials from `AWS_*`)
//! - `RUST_LOG`: log filter (default: info)
//!
//! ## Exit Status
//!
//! Stage commands exit non-zero when any job failed, after printing the
//! report, so schedulers can retry the stage.

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dayarchive_metadata::{SqliteArchiveStore, StatementStore};
use dayarchive_storage::{DayArchiveService, StageReport};
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod format;

use config::Config;
use format::{ArchiveRow, Formatter, OutputFormat, PlatformRow, ScopeRow};

#[derive(Parser)]
#[command(name = "archivectl")]
#[command(about = "Day archive pipeline command-line tool", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "DAYARCHIVE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "DAYARCHIVE_DB")]
    db: Option<PathBuf>,

    /// Staging directory for intermediate artifacts
    #[arg(long, env = "DAYARCHIVE_STAGING")]
    staging: Option<PathBuf>,

    /// Publish to a local directory
    #[arg(long, env = "DAYARCHIVE_PUBLIC_DIR")]
    public_dir: Option<PathBuf>,

    /// Publish to an S3 bucket
    #[arg(long, env = "DAYARCHIVE_BUCKET")]
    bucket: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, write and finalize every archive of a day
    Run {
        /// Day to archive (YYYY-MM-DD or "yesterday")
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Re-write and finalize the incomplete archives of a built day
    Resume {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Compress and checksum closed raw files of a day
    Finalize {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Verify and upload completed archives of a day
    Publish {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Delete raw files of completed archives
    CleanupRaw {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Delete zip and checksum files of published archives
    CleanupArchive {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Drop the unfinished archives of a day so it can be rebuilt
    Discard {
        #[arg(short, long)]
        date: String,
    },
    /// List archives
    List {
        /// Every archive of one day, complete or not
        #[arg(short, long, conflicts_with_all = ["slug", "global"])]
        date: Option<String>,
        /// Completed archives of one scope
        #[arg(short, long, conflicts_with = "global")]
        slug: Option<String>,
        /// Completed global archives (default)
        #[arg(short, long)]
        global: bool,
    },
    /// Show the global full archive of a day
    Get {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
    /// Show every archive scope and its slug
    Scopes,
    /// Show registered platforms
    Platforms,
    /// Show the first and last statement id of a day
    Bounds {
        #[arg(short, long, default_value = "yesterday")]
        date: String,
    },
}

/// Parse `YYYY-MM-DD`, `yesterday` or `today` relative to `today`.
fn parse_day(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    match input {
        "yesterday" => Ok(today - Duration::days(1)),
        "today" => Ok(today),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", other)),
    }
}

fn day(input: &str) -> Result<NaiveDate> {
    parse_day(input, Utc::now().date_naive())
}

fn public_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    if let Some(dir) = &config.public.local_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create public directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Publishing to local directory");
        return Ok(Arc::new(object_store::local::LocalFileSystem::new_with_prefix(dir)?));
    }

    if let Some(bucket) = &config.public.bucket {
        tracing::info!(bucket = %bucket, "Publishing to S3");
        let s3 = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        return Ok(Arc::new(s3));
    }

    let fallback = PathBuf::from("./data/public");
    std::fs::create_dir_all(&fallback)?;
    tracing::info!(path = %fallback.display(), "No public store configured, using local directory");
    Ok(Arc::new(object_store::local::LocalFileSystem::new_with_prefix(fallback)?))
}

fn finish(formatter: &Formatter, reports: &[&StageReport]) -> Result<()> {
    for report in reports {
        formatter.print_report(report)?;
    }
    let failed: usize = reports.iter().map(|r| r.failed.len()).sum();
    if failed > 0 {
        bail!("{} archive job(s) failed", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }
    if let Some(staging) = cli.staging {
        config.archive.staging_dir = staging;
    }
    if let Some(dir) = cli.public_dir {
        config.public.local_dir = Some(dir);
    }
    if let Some(bucket) = cli.bucket {
        config.public.bucket = Some(bucket);
    }

    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Arc::new(
        SqliteArchiveStore::new(&config.database)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.display()))?,
    );
    let public = public_store(&config)?;
    let service = DayArchiveService::new(store.clone(), store.clone(), public, config.archive.clone())?;
    let formatter = Formatter::new(cli.output, !cli.no_color);

    match cli.command {
        Commands::Run { date } => {
            let report = service.run_pipeline(day(&date)?).await?;
            finish(&formatter, &[&report.write, &report.finalize])?;
        }
        Commands::Resume { date } => {
            let report = service.resume(day(&date)?).await?;
            finish(&formatter, &[&report.write, &report.finalize])?;
        }
        Commands::Finalize { date } => {
            let report = service.finalize(day(&date)?).await?;
            finish(&formatter, &[&report])?;
        }
        Commands::Publish { date } => {
            let report = service.publish(day(&date)?).await?;
            finish(&formatter, &[&report])?;
        }
        Commands::CleanupRaw { date } => {
            let report = service.cleanup_raw(day(&date)?).await?;
            finish(&formatter, &[&report])?;
        }
        Commands::CleanupArchive { date } => {
            let report = service.cleanup_archive(day(&date)?).await?;
            finish(&formatter, &[&report])?;
        }
        Commands::Discard { date } => {
            let date = day(&date)?;
            let removed = service.discard_day(date).await?;
            formatter.print_success(&format!("Discarded {} archive(s) of {}", removed, date));
        }
        Commands::List { date, slug, global: _ } => {
            let archives = match (date, slug) {
                (Some(date), _) => service.list_for_day(day(&date)?).await?,
                (None, Some(slug)) => service.list_by_slug(&slug).await?,
                (None, None) => service.global_list().await?,
            };
            formatter.print_list(archives.iter().map(ArchiveRow::from).collect())?;
        }
        Commands::Get { date } => {
            let date = day(&date)?;
            match service.get_day_archive_by_date(date).await? {
                Some(archive) => formatter.print_list(vec![ArchiveRow::from(&archive)])?,
                None => bail!("No day archive for {}", date),
            }
        }
        Commands::Scopes => {
            let scopes = service.build_basic_array().await?;
            formatter.print_list(scopes.iter().map(ScopeRow::from).collect())?;
        }
        Commands::Platforms => {
            let platforms = store.list_platforms().await?;
            formatter.print_list(platforms.iter().map(PlatformRow::from).collect())?;
        }
        Commands::Bounds { date } => {
            let date = day(&date)?;
            let first = service.first_id_of_day(date).await?;
            let last = service.last_id_of_day(date).await?;
            formatter.print_success(&format!("{}: first id {}, last id {}", date, first, last));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day() {
        let today = NaiveDate::from_ymd_opt(2023, 8, 10).unwrap();
        assert_eq!(
            parse_day("yesterday", today).unwrap(),
            NaiveDate::from_ymd_opt(2023, 8, 9).unwrap()
        );
        assert_eq!(parse_day("today", today).unwrap(), today);
        assert_eq!(
            parse_day("2023-01-31", today).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap()
        );
        assert!(parse_day("31/01/2023", today).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["archivectl", "--db", "/tmp/a.db", "publish", "--date", "2023-08-08"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/a.db")));
        assert!(matches!(cli.command, Commands::Publish { ref date } if date == "2023-08-08"));

        let cli = Cli::try_parse_from(["archivectl", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { ref date } if date == "yesterday"));

        assert!(Cli::try_parse_from(["archivectl", "list", "--date", "2023-08-08", "--global"]).is_err());
    }
}
