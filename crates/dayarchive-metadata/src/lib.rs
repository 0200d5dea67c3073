//! Day Archive Metadata Store
//!
//! This crate holds the two pieces of persistent state the archive pipeline
//! depends on:
//!
//! - **Record store**: the append-only statements table. The pipeline only
//!   reads it (id range scans and min/max id lookups); appends exist for the
//!   submission layer and for tests.
//! - **Day archive store**: one tracking row per (day, scope, variant) archive,
//!   plus the per-day claim that guards against building a day twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌───────────────────────┐
//! │ Submission layer │──────▶ │  statements (append)  │
//! └──────────────────┘        └──────────┬────────────┘
//!                                        │ range scans
//!                             ┌──────────▼────────────┐
//!                             │   Archive pipeline    │
//!                             └──────────┬────────────┘
//!                                        │ claim / track
//!                             ┌──────────▼────────────┐
//!                             │ day_archives + claims │ ◄── You are here
//!                             └───────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use dayarchive_metadata::{SqliteArchiveStore, StatementStore, DayArchiveStore};
//!
//! let store = SqliteArchiveStore::new("archive.db").await?;
//! let platforms = store.list_platforms().await?;
//! let usable = store.global_list().await?;
//! ```
//!
//! ## Thread Safety
//! - SQLx connection pool handles concurrent access
//! - The day claim and the day's rows are written in one transaction
//! - Safe to share across async tasks via Arc<>

pub mod error;
pub mod store;
pub mod types;

pub use error::{MetadataError, Result};
pub use store::SqliteArchiveStore;
pub use types::*;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use dayarchive_core::Statement;

/// Read interface over the append-only statements table.
///
/// Identifiers increase with insertion order. Timestamps have second precision.
#[async_trait]
pub trait StatementStore: Send + Sync {
    /// Register a platform and return it with its assigned id.
    async fn create_platform(&self, name: &str) -> Result<Platform>;

    /// All platforms, ordered by id.
    async fn list_platforms(&self) -> Result<Vec<Platform>>;

    /// Append a statement. Assigns the next id and a fresh uuid.
    ///
    /// # Errors
    ///
    /// - `PlatformNotFound`: the platform id is unknown
    async fn append_statement(&self, statement: NewStatement) -> Result<Statement>;

    /// Smallest id among records created exactly at one of `marks`.
    async fn min_id_at(&self, marks: &[NaiveDateTime]) -> Result<Option<i64>>;

    /// Largest id among records created exactly at one of `marks`.
    async fn max_id_at(&self, marks: &[NaiveDateTime]) -> Result<Option<i64>>;

    /// Smallest id among records created within `[from, to]`.
    ///
    /// # Performance
    ///
    /// Scans the whole window. Only used as the slow path of the boundary lookup.
    async fn min_id_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Option<i64>>;

    /// Largest id among records created within `[from, to]`.
    async fn max_id_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Option<i64>>;

    /// At most `limit` records with `after_id < id <= last_id`, ordered by id.
    async fn statements_after(
        &self,
        after_id: i64,
        last_id: i64,
        limit: u32,
    ) -> Result<Vec<Statement>>;
}

/// Tracking rows for day archives.
#[async_trait]
pub trait DayArchiveStore: Send + Sync {
    /// Claim `date` and insert all of its pending rows in one transaction.
    ///
    /// This is the single overwrite guard of the pipeline: the claim succeeds
    /// only when neither a claim nor any row exists for the date.
    ///
    /// # Errors
    ///
    /// - `DayAlreadyArchived`: the day is already claimed or has rows. Nothing
    ///   is inserted.
    async fn claim_day(&self, date: NaiveDate, archives: Vec<NewDayArchive>)
        -> Result<Vec<DayArchive>>;

    /// Whether a claim or any row exists for the date.
    async fn is_day_claimed(&self, date: NaiveDate) -> Result<bool>;

    /// Every row of the date, complete or not, in creation order.
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<DayArchive>>;

    async fn get_day_archive(&self, id: i64) -> Result<Option<DayArchive>>;

    /// Record the closed raw file and its row count.
    async fn update_raw(&self, id: i64, raw_path: &str, total: u64) -> Result<()>;

    /// Record the compressed artifact and checksum and set `completed_at`,
    /// all in one statement.
    async fn mark_complete(&self, id: i64, completion: ArchiveCompletion) -> Result<()>;

    /// Completed global archives, newest day first.
    async fn global_list(&self) -> Result<Vec<DayArchive>>;

    /// Completed archives with the given slug, newest day first.
    async fn list_by_slug(&self, slug: &str) -> Result<Vec<DayArchive>>;

    /// The global full-variant row of a date, complete or not.
    async fn get_day_archive_by_date(&self, date: NaiveDate) -> Result<Option<DayArchive>>;

    /// Delete every row of a date and release its claim.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// - `CompletedArchivesExist`: at least one row of the date is complete
    async fn discard_day(&self, date: NaiveDate) -> Result<u64>;
}
