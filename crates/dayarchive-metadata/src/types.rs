//! Metadata Type Definitions
//!
//! ## Types Overview
//!
//! ### Platform
//! A submitter of statements. Each platform gets its own archive scope.
//!
//! ### NewStatement
//! A statement about to be appended to the record store.
//!
//! ### NewDayArchive
//! A pending tracking row created by the matrix builder.
//!
//! ### DayArchive
//! The persisted tracking row of one (day, scope, variant) archive. Usable for
//! listing and download only once `completed_at` is set.
//!
//! ### ArchiveCompletion
//! Everything the finalizer records in the single completing update.
//!
//! ## Design Decisions
//!
//! - Bookkeeping timestamps are i64 (milliseconds since epoch), as elsewhere
//! - Statement ids are i64 to match SQLite INTEGER PRIMARY KEY
//! - Days are `chrono::NaiveDate`, always interpreted in UTC

use chrono::{NaiveDate, NaiveDateTime};
use dayarchive_core::{Scope, StatementAttributes, Variant};
use serde::{Deserialize, Serialize};

/// A platform submitting statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: String,
    pub uuid: String,
}

/// A statement to append to the record store.
#[derive(Debug, Clone)]
pub struct NewStatement {
    pub platform_id: i64,
    pub puid: String,
    /// Creation time, truncated to the second on insert
    pub created_at: NaiveDateTime,
    pub attributes: StatementAttributes,
}

/// Record-id range of one calendar day. `0` on either side means no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayRange {
    pub first_id: i64,
    pub last_id: i64,
}

impl DayRange {
    pub fn new(first_id: i64, last_id: i64) -> Self {
        Self { first_id, last_id }
    }

    pub fn is_empty(&self) -> bool {
        self.first_id == 0 || self.last_id == 0 || self.first_id > self.last_id
    }
}

/// Pending tracking row.
#[derive(Debug, Clone)]
pub struct NewDayArchive {
    pub date: NaiveDate,
    pub scope: Scope,
    pub variant: Variant,
    pub slug: String,
    pub range: DayRange,
}

/// Fields set by the finalizer in one update.
#[derive(Debug, Clone)]
pub struct ArchiveCompletion {
    pub archive_path: String,
    pub checksum_path: String,
    pub archive_size: u64,
    pub checksum: String,
}

/// Persisted tracking row of one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayArchive {
    pub id: i64,
    pub date: NaiveDate,
    pub scope: Scope,
    pub variant: Variant,
    pub slug: String,

    /// Rows written (set when the raw file is closed)
    pub total: u64,

    /// Record-id range the archive was built from
    pub range: DayRange,

    pub raw_path: Option<String>,
    pub archive_path: Option<String>,
    pub checksum_path: Option<String>,
    pub archive_size: Option<u64>,
    pub checksum: Option<String>,

    /// Set only once the compressed artifact and checksum exist
    pub completed_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl DayArchive {
    /// Whether the archive may be listed or downloaded.
    pub fn is_usable(&self) -> bool {
        self.completed_at.is_some()
    }
}
