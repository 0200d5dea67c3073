//! Archive Publisher
//!
//! Copies completed archives from the staging area to the public object store
//! (S3 in production, a local directory or in-memory store elsewhere).
//!
//! ## Verification
//!
//! Before anything is uploaded the zip is hashed again and the digest must
//! agree with both the checksum file next to it and the checksum recorded on
//! the tracking row. Any disagreement is a `DataIntegrity` error and nothing
//! of that job is published.
//!
//! ## Layout
//!
//! ```text
//! <public_prefix>/sor-<slug>-<date>-<variant>.csv.zip
//! <public_prefix>/sor-<slug>-<date>-<variant>.csv.zip.sha1
//! ```
//!
//! The zip is uploaded before its checksum, so a present checksum object
//! implies a present archive. Publishing the same job again overwrites both
//! objects with identical bytes.

use bytes::Bytes;
use dayarchive_metadata::DayArchiveStore;
use object_store::{path::Path, ObjectStore};
use std::sync::Arc;

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::finalizer::{parse_checksum_line, sha1_bytes};
use crate::matrix::ArchiveJob;
use crate::report::StageReport;
use crate::staging::StagingArea;

enum Published {
    Uploaded,
    Skipped(String),
}

pub struct Publisher {
    archives: Arc<dyn DayArchiveStore>,
    staging: StagingArea,
    public: Arc<dyn ObjectStore>,
    prefix: String,
}

impl Publisher {
    pub fn new(
        archives: Arc<dyn DayArchiveStore>,
        staging: StagingArea,
        public: Arc<dyn ObjectStore>,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            archives,
            staging,
            public,
            prefix: config.public_prefix.trim_matches('/').to_string(),
        }
    }

    /// Object store location of an artifact.
    pub fn public_path(&self, name: &str) -> Path {
        if self.prefix.is_empty() {
            Path::from(name)
        } else {
            Path::from(format!("{}/{}", self.prefix, name))
        }
    }

    /// Whether both the archive and its checksum are present in the public store.
    pub async fn is_published(&self, job: &ArchiveJob) -> Result<bool> {
        for name in [&job.paths.archive, &job.paths.checksum] {
            match self.public.head(&self.public_path(name)).await {
                Ok(_) => {}
                Err(object_store::Error::NotFound { .. }) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Verify and upload every completed archive of `jobs`.
    pub async fn publish_archives(&self, jobs: &[ArchiveJob]) -> StageReport {
        let mut report = StageReport::new("publish");

        for job in jobs {
            match self.publish_one(job).await {
                Ok(Published::Uploaded) => report.succeed(job),
                Ok(Published::Skipped(reason)) => report.skip(job, reason),
                Err(e) => report.fail(job, &e),
            }
        }

        tracing::info!(
            published = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Published day archives"
        );

        report
    }

    async fn publish_one(&self, job: &ArchiveJob) -> Result<Published> {
        let Some(row) = self.archives.get_day_archive(job.archive_id).await? else {
            return Ok(Published::Skipped("tracking row no longer exists".to_string()));
        };
        if !row.is_usable() {
            return Ok(Published::Skipped("archive is not complete".to_string()));
        }

        let archive_exists = self.staging.exists(&job.paths.archive).await?;
        let checksum_exists = self.staging.exists(&job.paths.checksum).await?;
        if !archive_exists || !checksum_exists {
            if self.is_published(job).await? {
                return Ok(Published::Skipped("already published".to_string()));
            }
            return Err(Error::TransientIo(format!(
                "staged artifacts of {} are missing and were never published",
                job.paths.archive
            )));
        }

        let archive = self.staging.read(&job.paths.archive).await?;
        let checksum_file = self.staging.read(&job.paths.checksum).await?;

        let actual = sha1_bytes(&archive);
        let listed = std::str::from_utf8(&checksum_file)
            .ok()
            .and_then(parse_checksum_line)
            .ok_or_else(|| {
                Error::DataIntegrity(format!("unreadable checksum file {}", job.paths.checksum))
            })?;

        if listed != actual {
            return Err(Error::DataIntegrity(format!(
                "{} hashes to {} but its checksum file lists {}",
                job.paths.archive, actual, listed
            )));
        }
        if row.checksum.as_deref() != Some(actual.as_str()) {
            return Err(Error::DataIntegrity(format!(
                "{} hashes to {} but the tracking row records {:?}",
                job.paths.archive, actual, row.checksum
            )));
        }

        let size = archive.len();
        self.public
            .put(&self.public_path(&job.paths.archive), Bytes::from(archive))
            .await?;
        self.public
            .put(&self.public_path(&job.paths.checksum), Bytes::from(checksum_file))
            .await?;

        tracing::info!(
            date = %job.date,
            slug = %job.slug,
            variant = %job.variant,
            size,
            location = %self.public_path(&job.paths.archive),
            "Published day archive"
        );

        Ok(Published::Uploaded)
    }
}
