//! Archive Finalizer
//!
//! Turns closed raw files into downloadable artifacts:
//!
//! ```text
//! sor-…-full.csv ──zip──▶ sor-…-full.csv.zip ──sha1──▶ sor-…-full.csv.zip.sha1
//!                                   │
//!                                   ▼
//!        UPDATE day_archives SET archive_path, checksum_path,
//!               archive_size, checksum, completed_at   (one statement)
//! ```
//!
//! `completed_at` is written only after both the zip and its checksum file
//! exist. If recording the completion fails, both artifacts are removed again
//! so a row without `completed_at` never has a finished archive next to it.
//!
//! Compression and hashing are blocking work and run on the blocking pool.
//! Up to `finalize_concurrency` jobs are in flight at once.

use dayarchive_metadata::{ArchiveCompletion, DayArchiveStore};
use futures::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::Path;
use std::sync::Arc;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::matrix::ArchiveJob;
use crate::report::StageReport;
use crate::staging::StagingArea;

/// Outcome of finalizing one job.
enum Finalized {
    Completed,
    Skipped(String),
}

/// Compress `raw` into a single-entry zip at `archive` named `entry_name`.
///
/// Returns the size of the written zip in bytes.
pub fn zip_raw_file(raw: &Path, archive: &Path, entry_name: &str) -> Result<u64> {
    let mut input = BufReader::new(File::open(raw)?);
    let output = BufWriter::new(File::create(archive)?);

    let mut zip = ZipWriter::new(output);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    zip.start_file(entry_name, options)?;
    io::copy(&mut input, &mut zip)?;

    let mut output = zip.finish()?;
    io::Write::flush(&mut output)?;

    Ok(std::fs::metadata(archive)?.len())
}

/// Lowercase hex SHA-1 of a file, read in fixed-size blocks.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-1 of an in-memory buffer.
pub fn sha1_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Contents of a checksum file: `<hex>  <zip file name>\n`.
pub fn checksum_line(hex: &str, archive_name: &str) -> String {
    format!("{}  {}\n", hex, archive_name)
}

/// Parse the hex digest from the contents of a checksum file.
pub fn parse_checksum_line(contents: &str) -> Option<&str> {
    contents
        .split_whitespace()
        .next()
        .filter(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

pub struct Finalizer {
    archives: Arc<dyn DayArchiveStore>,
    staging: StagingArea,
    concurrency: usize,
}

impl Finalizer {
    pub fn new(
        archives: Arc<dyn DayArchiveStore>,
        staging: StagingArea,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            archives,
            staging,
            concurrency: config.finalize_concurrency.max(1),
        }
    }

    /// Compress, checksum and complete every finished raw file of `jobs`.
    pub async fn generate_zips_sha1s_and_update(&self, jobs: &[ArchiveJob]) -> StageReport {
        let results: Vec<(&ArchiveJob, Result<Finalized>)> = stream::iter(jobs)
            .map(|job| async move { (job, self.finalize_one(job).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = StageReport::new("finalize");
        for (job, result) in results {
            match result {
                Ok(Finalized::Completed) => report.succeed(job),
                Ok(Finalized::Skipped(reason)) => report.skip(job, reason),
                Err(e) => report.fail(job, &e),
            }
        }

        tracing::info!(
            completed = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Finalized day archives"
        );

        report
    }

    async fn finalize_one(&self, job: &ArchiveJob) -> Result<Finalized> {
        let Some(row) = self.archives.get_day_archive(job.archive_id).await? else {
            return Ok(Finalized::Skipped("tracking row no longer exists".to_string()));
        };
        if row.is_usable() {
            return Ok(Finalized::Skipped("already complete".to_string()));
        }
        if row.raw_path.is_none() {
            return Ok(Finalized::Skipped("raw file was never closed".to_string()));
        }
        if !self.staging.exists(&job.paths.raw).await? {
            return Ok(Finalized::Skipped("raw file is missing".to_string()));
        }

        let raw = self.staging.path(&job.paths.raw);
        let archive = self.staging.path(&job.paths.archive);
        let entry_name = job.paths.raw.clone();

        let (archive_size, checksum) = tokio::task::spawn_blocking(move || {
            let size = zip_raw_file(&raw, &archive, &entry_name)?;
            let hex = sha1_file(&archive)?;
            Ok::<_, Error>((size, hex))
        })
        .await
        .map_err(|e| Error::TransientIo(format!("compression task failed: {}", e)))??;

        self.staging
            .write(
                &job.paths.checksum,
                checksum_line(&checksum, &job.paths.archive).as_bytes(),
            )
            .await?;

        let completion = ArchiveCompletion {
            archive_path: job.paths.archive.clone(),
            checksum_path: job.paths.checksum.clone(),
            archive_size,
            checksum: checksum.clone(),
        };

        if let Err(e) = self.archives.mark_complete(job.archive_id, completion).await {
            for key in [&job.paths.checksum, &job.paths.archive] {
                if let Err(remove_err) = self.staging.remove(key).await {
                    tracing::warn!(
                        date = %job.date,
                        slug = %job.slug,
                        variant = %job.variant,
                        file = %key,
                        error = %remove_err,
                        "Failed to remove artifact of uncompleted archive"
                    );
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            date = %job.date,
            slug = %job.slug,
            variant = %job.variant,
            archive_size,
            checksum = %checksum,
            "Day archive complete"
        );

        Ok(Finalized::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_zip_has_single_entry_with_raw_contents() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("sor-global-2023-08-08-full.csv");
        let archive = dir.path().join("sor-global-2023-08-08-full.csv.zip");
        std::fs::write(&raw, b"uuid,category\nabc,scams\n").unwrap();

        let size = zip_raw_file(&raw, &archive, "sor-global-2023-08-08-full.csv").unwrap();
        assert_eq!(size, std::fs::metadata(&archive).unwrap().len());

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        let mut entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "sor-global-2023-08-08-full.csv");
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "uuid,category\nabc,scams\n");
    }

    #[test]
    fn test_sha1_of_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"abc").unwrap();

        let hex = sha1_file(&path).unwrap();
        assert_eq!(hex, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(hex, sha1_bytes(b"abc"));
    }

    #[test]
    fn test_checksum_line_roundtrip() {
        let hex = sha1_bytes(b"abc");
        let line = checksum_line(&hex, "a.csv.zip");
        assert_eq!(line, format!("{}  a.csv.zip\n", hex));
        assert_eq!(parse_checksum_line(&line), Some(hex.as_str()));
        assert_eq!(parse_checksum_line("not-a-digest  a.csv.zip\n"), None);
    }
}
