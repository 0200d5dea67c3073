//! Streaming Raw File Writer
//!
//! Writes one delimited file per archive job of a day while scanning the day's
//! statements exactly once.
//!
//! ## Fan-Out Population
//!
//! ```text
//!                        ┌──────────────────────┐
//!  statements_after() ──▶│ chunk (≤ chunk_size) │
//!                        └──────────┬───────────┘
//!                                   │ render once per variant
//!              ┌────────────────────┼────────────────────┐
//!              ▼                    ▼                    ▼
//!        global/full          platform-7/light    category-scams/full
//!        (matches all)        (platform == 7)     (category == scams)
//! ```
//!
//! One producer pulls chunks of at most `chunk_size` statements with keyset
//! pagination over `[first_id, last_id]`. Each row is encoded once per variant
//! and appended to every open file whose scope matches. Everything runs on a
//! single task: each file has exactly one writer and chunks are read
//! sequentially.
//!
//! ## Failure Isolation
//!
//! A write error closes only the affected file. Its job is reported as failed,
//! its tracking row never gets a raw path, and the remaining files keep
//! receiving rows. A record store failure aborts population for the whole day,
//! since every job would miss the same rows; the stage can then be re-run,
//! which truncates every file again.

use csv::{Terminator, WriterBuilder};
use dayarchive_core::{Statement, Variant};
use dayarchive_metadata::{DayArchiveStore, DayRange, StatementStore};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::matrix::ArchiveJob;
use crate::report::StageReport;
use crate::staging::StagingArea;

/// Encodes records into delimited lines with `\n` terminators.
pub struct RowEncoder {
    builder: WriterBuilder,
    writer: csv::Writer<Vec<u8>>,
}

impl RowEncoder {
    pub fn new(delimiter: u8) -> Self {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(delimiter)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true);
        let writer = builder.from_writer(Vec::new());
        Self { builder, writer }
    }

    /// Encode one record and return its bytes.
    pub fn encode<I, T>(&mut self, record: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(record)?;
        self.writer.flush()?;
        let writer = std::mem::replace(&mut self.writer, self.builder.from_writer(Vec::new()));
        Ok(writer.into_inner().map_err(|e| e.into_error())?)
    }
}

/// An open raw file and the job it belongs to.
pub struct OpenCsvFile {
    pub job: ArchiveJob,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl OpenCsvFile {
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    async fn append(&mut self, line: &[u8]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line).await?;
            self.rows += 1;
        }
        Ok(())
    }
}

/// The open raw files of one day plus the jobs that already failed.
pub struct OpenCsvFiles {
    pub files: Vec<OpenCsvFile>,
    pub report: StageReport,
}

impl OpenCsvFiles {
    pub fn open_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_open()).count()
    }

    fn fail(&mut self, index: usize, error: &Error) {
        let file = &mut self.files[index];
        file.writer = None;
        self.report.fail(&file.job, error);
    }
}

pub struct CsvWriter {
    statements: Arc<dyn StatementStore>,
    archives: Arc<dyn DayArchiveStore>,
    staging: StagingArea,
    chunk_size: u32,
    delimiter: u8,
}

impl CsvWriter {
    pub fn new(
        statements: Arc<dyn StatementStore>,
        archives: Arc<dyn DayArchiveStore>,
        staging: StagingArea,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            statements,
            archives,
            staging,
            chunk_size: config.chunk_size,
            delimiter: config.delimiter_byte(),
        }
    }

    /// Create (or truncate) every raw file and write its header row.
    pub async fn start_all_csv_files(&self, jobs: &[ArchiveJob]) -> OpenCsvFiles {
        let mut encoder = RowEncoder::new(self.delimiter);
        let mut open = OpenCsvFiles {
            files: Vec::with_capacity(jobs.len()),
            report: StageReport::new("write"),
        };

        for job in jobs {
            match self.start_csv_file(job, &mut encoder).await {
                Ok(writer) => open.files.push(OpenCsvFile {
                    job: job.clone(),
                    writer: Some(writer),
                    rows: 0,
                }),
                Err(e) => {
                    open.report.fail(job, &e);
                    open.files.push(OpenCsvFile {
                        job: job.clone(),
                        writer: None,
                        rows: 0,
                    });
                }
            }
        }

        tracing::info!(
            files = open.open_count(),
            failed = open.report.failed.len(),
            "Started raw files"
        );

        open
    }

    async fn start_csv_file(
        &self,
        job: &ArchiveJob,
        encoder: &mut RowEncoder,
    ) -> Result<BufWriter<File>> {
        let file = self.staging.create(&job.paths.raw).await?;
        let mut writer = BufWriter::new(file);
        let header = encoder.encode(job.variant.headings())?;
        writer.write_all(&header).await?;
        Ok(writer)
    }

    /// Stream the day's statements into every open file whose scope matches.
    ///
    /// # Errors
    ///
    /// - `TransientIo`: the record store failed; no file is complete and the
    ///   stage must be re-run from `start_all_csv_files`
    pub async fn populate(&self, files: &mut OpenCsvFiles, range: DayRange) -> Result<u64> {
        if range.is_empty() {
            tracing::info!("No statements for the day, raw files keep only their header");
            return Ok(0);
        }

        let mut full = RowEncoder::new(self.delimiter);
        let mut light = RowEncoder::new(self.delimiter);
        let mut after_id = range.first_id - 1;
        let mut scanned = 0u64;

        loop {
            let chunk = self
                .statements
                .statements_after(after_id, range.last_id, self.chunk_size)
                .await
                .map_err(|e| {
                    Error::TransientIo(format!(
                        "record store failed after id {}: {}",
                        after_id, e
                    ))
                })?;

            let Some(last) = chunk.last() else {
                break;
            };
            after_id = last.id;
            scanned += chunk.len() as u64;

            for statement in &chunk {
                self.fan_out(files, statement, &mut full, &mut light).await;
            }

            tracing::debug!(after_id, scanned, "Wrote statement chunk");

            if chunk.len() < self.chunk_size as usize || after_id >= range.last_id {
                break;
            }
        }

        tracing::info!(
            first_id = range.first_id,
            last_id = range.last_id,
            scanned,
            "Populated raw files"
        );

        Ok(scanned)
    }

    async fn fan_out(
        &self,
        files: &mut OpenCsvFiles,
        statement: &Statement,
        full: &mut RowEncoder,
        light: &mut RowEncoder,
    ) {
        let mut lines: [Option<Vec<u8>>; 2] = [None, None];

        for index in 0..files.files.len() {
            let file = &files.files[index];
            if !file.is_open() || !file.job.scope.matches(statement) {
                continue;
            }

            let variant = file.job.variant;
            let slot = match variant {
                Variant::Full => 0,
                Variant::Light => 1,
            };

            if lines[slot].is_none() {
                let encoder = match variant {
                    Variant::Full => &mut *full,
                    Variant::Light => &mut *light,
                };
                match encoder.encode(statement.to_row(variant)) {
                    Ok(line) => lines[slot] = Some(line),
                    Err(e) => {
                        files.fail(index, &e);
                        continue;
                    }
                }
            }

            if let Some(line) = &lines[slot] {
                if let Err(e) = files.files[index].append(line).await {
                    files.fail(index, &e);
                }
            }
        }
    }

    /// Flush and close every open file and record its raw path and row count.
    pub async fn close_all_csv_files(&self, mut files: OpenCsvFiles) -> StageReport {
        for index in 0..files.files.len() {
            let Some(mut writer) = files.files[index].writer.take() else {
                continue;
            };

            let result = async {
                writer.flush().await?;
                writer.into_inner().sync_all().await?;
                let file = &files.files[index];
                self.archives
                    .update_raw(file.job.archive_id, &file.job.paths.raw, file.rows)
                    .await?;
                Ok::<_, Error>(())
            }
            .await;

            let file = &files.files[index];
            match result {
                Ok(()) => {
                    tracing::debug!(
                        date = %file.job.date,
                        slug = %file.job.slug,
                        variant = %file.job.variant,
                        total = file.rows,
                        "Closed raw file"
                    );
                    files.report.succeed(&file.job);
                }
                Err(e) => {
                    let job = file.job.clone();
                    files.report.fail(&job, &e);
                }
            }
        }

        tracing::info!(
            closed = files.report.succeeded.len(),
            failed = files.report.failed.len(),
            "Closed raw files"
        );

        files.report
    }

    /// Run the whole write stage for `jobs`.
    pub async fn write_day(&self, jobs: &[ArchiveJob], range: DayRange) -> Result<StageReport> {
        let mut files = self.start_all_csv_files(jobs).await;
        self.populate(&mut files, range).await?;
        Ok(self.close_all_csv_files(files).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_header_line() {
        let mut encoder = RowEncoder::new(b',');
        let line = encoder.encode(Variant::Light.headings()).unwrap();
        let expected = format!("{}\n", Variant::Light.headings().join(","));
        assert_eq!(String::from_utf8(line).unwrap(), expected);
    }

    #[test]
    fn test_encoder_quotes_embedded_delimiters() {
        let mut encoder = RowEncoder::new(b';');
        let line = encoder.encode(["a;b", "plain", "say \"hi\""]).unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "\"a;b\";plain;\"say \"\"hi\"\"\"\n"
        );

        // The buffer is drained between records
        let line = encoder.encode(["x", "y", "z"]).unwrap();
        assert_eq!(line, b"x;y;z\n");
    }
}
