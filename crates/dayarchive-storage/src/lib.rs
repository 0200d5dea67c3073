//! Day Archive Generation Pipeline
//!
//! Produces, once per closed calendar day, downloadable bulk archives of every
//! statement created that day: one global archive, one per platform, one per
//! category and one per decision ground, each in a `full` and a `light`
//! variant.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────┐   ┌────────────────┐   ┌──────────────────┐
//!   │ BoundaryLocator  │──▶│ MatrixBuilder  │──▶│    CsvWriter     │
//!   │ first/last id    │   │ claim + jobs   │   │ header + chunks  │
//!   └──────────────────┘   └────────────────┘   └────────┬─────────┘
//!                                                        │ raw files
//!   ┌──────────────────┐   ┌────────────────┐   ┌────────▼─────────┐
//!   │     Cleaner      │◀──│   Publisher    │◀──│    Finalizer     │
//!   │ raw, then zips   │   │ verify + put   │   │ zip + sha1 + row │
//!   └──────────────────┘   └────────────────┘   └──────────────────┘
//! ```
//!
//! Intermediate artifacts live in a local [`StagingArea`]. Published archives
//! live in any `object_store::ObjectStore`. Tracking rows live in the
//! `dayarchive-metadata` store and only become visible to listings once
//! `completed_at` is set.
//!
//! ## Guarantees
//!
//! - A day is built at most once; concurrent builders get `Error::Conflict`
//! - Each raw file has exactly one writer and the day is scanned once
//! - A failing job never stops its siblings
//! - Archives are never published with a mismatching checksum
//! - Cleanup passes are idempotent

pub mod boundary;
pub mod cleanup;
pub mod config;
pub mod csv_writer;
pub mod error;
pub mod finalizer;
pub mod matrix;
pub mod publisher;
pub mod report;
pub mod service;
pub mod staging;

pub use boundary::{build_end_of_day_marks, build_start_of_day_marks, BoundaryLocator};
pub use cleanup::Cleaner;
pub use config::ArchiveConfig;
pub use csv_writer::{CsvWriter, OpenCsvFiles, RowEncoder};
pub use error::{Error, Result};
pub use finalizer::{checksum_line, sha1_bytes, Finalizer};
pub use matrix::{ArchiveJob, DayGuard, DayLocks, MatrixBuilder, ScopeEntry};
pub use publisher::Publisher;
pub use report::{JobFailure, JobSkip, StageReport};
pub use service::{DayArchiveService, PipelineReport};
pub use staging::StagingArea;
