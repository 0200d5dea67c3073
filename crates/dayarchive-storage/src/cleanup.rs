//! Staging Area Cleanup
//!
//! Two independent passes reclaim local disk once artifacts are no longer
//! needed:
//!
//! 1. `clean_up_csv_files`: raw files, once the job's archive is complete
//! 2. `clean_up_zip_and_sha1_files`: zip and checksum files, once both are
//!    present in the public store
//!
//! Jobs whose precondition does not hold are skipped with a warning. A file
//! that is already gone counts as cleaned, so either pass can be re-run.

use dayarchive_metadata::DayArchiveStore;
use std::sync::Arc;

use crate::error::Result;
use crate::matrix::ArchiveJob;
use crate::publisher::Publisher;
use crate::report::StageReport;
use crate::staging::StagingArea;

pub struct Cleaner {
    archives: Arc<dyn DayArchiveStore>,
    staging: StagingArea,
    requires_publish: bool,
}

impl Cleaner {
    pub fn new(
        archives: Arc<dyn DayArchiveStore>,
        staging: StagingArea,
        requires_publish: bool,
    ) -> Self {
        Self {
            archives,
            staging,
            requires_publish,
        }
    }

    /// Delete the raw file of every job whose archive and checksum exist.
    pub async fn clean_up_csv_files(&self, jobs: &[ArchiveJob]) -> StageReport {
        let mut report = StageReport::new("cleanup-raw");

        for job in jobs {
            match self.clean_raw(job).await {
                Ok(None) => report.succeed(job),
                Ok(Some(reason)) => report.skip(job, reason),
                Err(e) => report.fail(job, &e),
            }
        }

        tracing::info!(
            cleaned = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Cleaned up raw files"
        );

        report
    }

    async fn clean_raw(&self, job: &ArchiveJob) -> Result<Option<String>> {
        let complete = self
            .archives
            .get_day_archive(job.archive_id)
            .await?
            .map(|row| row.is_usable())
            .unwrap_or(false);
        if !complete {
            return Ok(Some("archive is not complete".to_string()));
        }

        let removed = self.staging.remove(&job.paths.raw).await?;
        tracing::debug!(file = %job.paths.raw, removed, "Removed raw file");
        Ok(None)
    }

    /// Delete the zip and checksum of every job whose publication is acknowledged.
    pub async fn clean_up_zip_and_sha1_files(
        &self,
        jobs: &[ArchiveJob],
        publisher: &Publisher,
    ) -> StageReport {
        let mut report = StageReport::new("cleanup-archive");

        for job in jobs {
            match self.clean_archive(job, publisher).await {
                Ok(None) => report.succeed(job),
                Ok(Some(reason)) => report.skip(job, reason),
                Err(e) => report.fail(job, &e),
            }
        }

        tracing::info!(
            cleaned = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Cleaned up archive and checksum files"
        );

        report
    }

    async fn clean_archive(&self, job: &ArchiveJob, publisher: &Publisher) -> Result<Option<String>> {
        if self.requires_publish && !publisher.is_published(job).await? {
            return Ok(Some("archive has not been published".to_string()));
        }

        let archive = self.staging.remove(&job.paths.archive).await?;
        let checksum = self.staging.remove(&job.paths.checksum).await?;
        tracing::debug!(
            file = %job.paths.archive,
            archive,
            checksum,
            "Removed archive and checksum files"
        );
        Ok(None)
    }
}
