//! Day Archive Service
//!
//! Wires the pipeline stages together behind the trigger and listing
//! operations used by the operator CLI and by scheduled jobs.
//!
//! ## Trigger Operations
//!
//! ```text
//! run_pipeline(date)     build matrix → write raw files → finalize
//! resume(date)           re-write and finalize the incomplete jobs of a built day
//! publish(date)          verify and upload completed archives
//! cleanup_raw(date)      delete raw files of completed archives
//! cleanup_archive(date)  delete zip/checksum files of published archives
//! discard_day(date)      drop an unfinished matrix so the day can be rebuilt
//! ```
//!
//! Every stage after the matrix build reloads its jobs from the tracking
//! store, so each operation can run in a different process from the others.
//!
//! ## Usage
//!
//! ```ignore
//! use dayarchive_storage::{ArchiveConfig, DayArchiveService};
//!
//! let service = DayArchiveService::new(store.clone(), store, public, config)?;
//! let report = service.run_pipeline(yesterday).await?;
//! service.publish(yesterday).await?;
//! service.cleanup_raw(yesterday).await?;
//! service.cleanup_archive(yesterday).await?;
//! ```

use chrono::{NaiveDate, Utc};
use dayarchive_metadata::{DayArchive, DayArchiveStore, StatementStore};
use object_store::ObjectStore;
use serde::Serialize;
use std::sync::Arc;

use crate::cleanup::Cleaner;
use crate::config::ArchiveConfig;
use crate::csv_writer::CsvWriter;
use crate::error::{Error, Result};
use crate::finalizer::Finalizer;
use crate::matrix::{ArchiveJob, MatrixBuilder, ScopeEntry};
use crate::publisher::Publisher;
use crate::report::StageReport;
use crate::staging::StagingArea;

/// Result of building and finalizing one day.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub date: NaiveDate,
    pub jobs: usize,
    pub statements: u64,
    pub write: StageReport,
    pub finalize: StageReport,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.write.is_success() && self.finalize.is_success()
    }
}

pub struct DayArchiveService {
    archives: Arc<dyn DayArchiveStore>,
    staging: StagingArea,
    matrix: MatrixBuilder,
    writer: CsvWriter,
    finalizer: Finalizer,
    publisher: Publisher,
    cleaner: Cleaner,
}

impl DayArchiveService {
    pub fn new(
        statements: Arc<dyn StatementStore>,
        archives: Arc<dyn DayArchiveStore>,
        public: Arc<dyn ObjectStore>,
        config: ArchiveConfig,
    ) -> Result<Self> {
        config.validate()?;
        let staging = StagingArea::new(&config.staging_dir);

        Ok(Self {
            matrix: MatrixBuilder::new(Arc::clone(&statements), Arc::clone(&archives)),
            writer: CsvWriter::new(
                Arc::clone(&statements),
                Arc::clone(&archives),
                staging.clone(),
                &config,
            ),
            finalizer: Finalizer::new(Arc::clone(&archives), staging.clone(), &config),
            publisher: Publisher::new(Arc::clone(&archives), staging.clone(), public, &config),
            cleaner: Cleaner::new(
                Arc::clone(&archives),
                staging.clone(),
                config.cleanup_requires_publish,
            ),
            archives,
            staging,
        })
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Build, write and finalize every archive of `date`.
    pub async fn run_pipeline(&self, date: NaiveDate) -> Result<PipelineReport> {
        self.run_pipeline_at(date, Utc::now().date_naive()).await
    }

    /// [`run_pipeline`](Self::run_pipeline) with an explicit current day.
    pub async fn run_pipeline_at(&self, date: NaiveDate, today: NaiveDate) -> Result<PipelineReport> {
        let jobs = self.matrix.build_starting_day_archives(date, today).await?;
        self.write_and_finalize(date, jobs).await
    }

    /// Re-run writing and finalizing for the incomplete jobs of an already
    /// built day. Raw files are truncated and written from scratch.
    ///
    /// # Errors
    ///
    /// - `Validation`: the day was never built
    pub async fn resume(&self, date: NaiveDate) -> Result<PipelineReport> {
        let archives = self.archives.list_for_date(date).await?;
        if archives.is_empty() {
            return Err(Error::Validation(format!(
                "No day archives exist for {}, run the pipeline first",
                date
            )));
        }

        let jobs: Vec<ArchiveJob> = archives
            .iter()
            .filter(|a| !a.is_usable())
            .map(ArchiveJob::from)
            .collect();
        if jobs.is_empty() {
            tracing::info!(date = %date, "Every day archive is already complete");
            return Ok(PipelineReport {
                date,
                jobs: 0,
                statements: 0,
                write: StageReport::new("write"),
                finalize: StageReport::new("finalize"),
            });
        }

        self.write_and_finalize(date, jobs).await
    }

    async fn write_and_finalize(&self, date: NaiveDate, jobs: Vec<ArchiveJob>) -> Result<PipelineReport> {
        let range = match jobs.first() {
            Some(job) => job.range,
            None => self.matrix.locator().day_range(date).await?,
        };

        let mut files = self.writer.start_all_csv_files(&jobs).await;
        let statements = self.writer.populate(&mut files, range).await?;
        let write = self.writer.close_all_csv_files(files).await;

        let closed: Vec<ArchiveJob> = jobs
            .iter()
            .filter(|job| !write.is_failed(job.archive_id))
            .cloned()
            .collect();
        let finalize = self.finalizer.generate_zips_sha1s_and_update(&closed).await;

        let report = PipelineReport {
            date,
            jobs: jobs.len(),
            statements,
            write,
            finalize,
        };

        if report.is_success() {
            tracing::info!(date = %date, jobs = report.jobs, statements, "Day archive pipeline finished");
        } else {
            tracing::warn!(
                date = %date,
                jobs = report.jobs,
                write_failures = report.write.failed.len(),
                finalize_failures = report.finalize.failed.len(),
                "Day archive pipeline finished with failures"
            );
        }

        Ok(report)
    }

    /// Compress and complete the closed raw files of `date`.
    pub async fn finalize(&self, date: NaiveDate) -> Result<StageReport> {
        let jobs = self.matrix.jobs_for_day(date).await?;
        Ok(self.finalizer.generate_zips_sha1s_and_update(&jobs).await)
    }

    pub async fn publish(&self, date: NaiveDate) -> Result<StageReport> {
        let jobs = self.matrix.jobs_for_day(date).await?;
        Ok(self.publisher.publish_archives(&jobs).await)
    }

    pub async fn cleanup_raw(&self, date: NaiveDate) -> Result<StageReport> {
        let jobs = self.matrix.jobs_for_day(date).await?;
        Ok(self.cleaner.clean_up_csv_files(&jobs).await)
    }

    pub async fn cleanup_archive(&self, date: NaiveDate) -> Result<StageReport> {
        let jobs = self.matrix.jobs_for_day(date).await?;
        Ok(self
            .cleaner
            .clean_up_zip_and_sha1_files(&jobs, &self.publisher)
            .await)
    }

    /// Drop the unfinished matrix of `date` and its staged raw files.
    ///
    /// # Errors
    ///
    /// - `Conflict`: at least one archive of the day is complete
    pub async fn discard_day(&self, date: NaiveDate) -> Result<u64> {
        let jobs = self.matrix.jobs_for_day(date).await?;
        let removed = self.archives.discard_day(date).await?;

        for job in &jobs {
            self.staging.remove(&job.paths.raw).await?;
        }

        tracing::info!(date = %date, rows = removed, "Discarded day archive matrix");
        Ok(removed)
    }

    pub async fn build_basic_array(&self) -> Result<Vec<ScopeEntry>> {
        self.matrix.build_basic_array().await
    }

    pub async fn first_id_of_day(&self, date: NaiveDate) -> Result<i64> {
        self.matrix.locator().first_id_of_day(date).await
    }

    pub async fn last_id_of_day(&self, date: NaiveDate) -> Result<i64> {
        self.matrix.locator().last_id_of_day(date).await
    }

    /// Completed global archives, newest day first.
    pub async fn global_list(&self) -> Result<Vec<DayArchive>> {
        Ok(self.archives.global_list().await?)
    }

    pub async fn list_by_slug(&self, slug: &str) -> Result<Vec<DayArchive>> {
        Ok(self.archives.list_by_slug(slug).await?)
    }

    pub async fn get_day_archive_by_date(&self, date: NaiveDate) -> Result<Option<DayArchive>> {
        Ok(self.archives.get_day_archive_by_date(date).await?)
    }

    /// Every tracking row of `date`, complete or not.
    pub async fn list_for_day(&self, date: NaiveDate) -> Result<Vec<DayArchive>> {
        Ok(self.archives.list_for_date(date).await?)
    }
}
