//! Stage Reports
//!
//! Every batch stage processes the whole job list of a day and isolates
//! failures per job. A `StageReport` records what happened to each job so the
//! trigger can decide what to retry. Failures are logged with the day, slug and
//! variant as they are recorded.

use dayarchive_core::Variant;
use serde::Serialize;

use crate::error::Error;
use crate::matrix::ArchiveJob;

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub archive_id: i64,
    pub slug: String,
    pub variant: Variant,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSkip {
    pub archive_id: i64,
    pub slug: String,
    pub variant: Variant,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub succeeded: Vec<i64>,
    pub skipped: Vec<JobSkip>,
    pub failed: Vec<JobFailure>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn succeed(&mut self, job: &ArchiveJob) {
        self.succeeded.push(job.archive_id);
    }

    pub fn skip(&mut self, job: &ArchiveJob, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            stage = self.stage,
            date = %job.date,
            slug = %job.slug,
            variant = %job.variant,
            reason = %reason,
            "Skipped archive job"
        );
        self.skipped.push(JobSkip {
            archive_id: job.archive_id,
            slug: job.slug.clone(),
            variant: job.variant,
            reason,
        });
    }

    pub fn fail(&mut self, job: &ArchiveJob, error: &Error) {
        tracing::error!(
            stage = self.stage,
            date = %job.date,
            slug = %job.slug,
            variant = %job.variant,
            error = %error,
            "Archive job failed"
        );
        self.failed.push(JobFailure {
            archive_id: job.archive_id,
            slug: job.slug.clone(),
            variant: job.variant,
            error: error.to_string(),
            retryable: error.is_retryable(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_failed(&self, archive_id: i64) -> bool {
        self.failed.iter().any(|f| f.archive_id == archive_id)
    }
}
