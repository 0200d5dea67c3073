//! Metadata Error Types
//!
//! ## Error Categories
//!
//! ### Day Archive Errors
//! - `DayAlreadyArchived`: a day archive set (or its claim) already exists for the date
//! - `CompletedArchivesExist`: refusing to discard a day that has published data
//! - `DayArchiveNotFound`: row id does not exist
//!
//! ### Record Store Errors
//! - `PlatformNotFound`: statement references an unknown platform
//!
//! ### Database Errors
//! - `DatabaseError`: SQLite operation failed (connection, query, constraint)
//! - `MigrationError`: embedded schema migration failed
//!
//! ### Data Errors
//! - `SerializationError`: statement attributes JSON could not be (de)serialized
//! - `InvalidRow`: persisted row does not decode into a valid type

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("A day archive for the date: {0} already exists")]
    DayAlreadyArchived(NaiveDate),

    #[error("Day {0} has completed archives and cannot be discarded")]
    CompletedArchivesExist(NaiveDate),

    #[error("Day archive not found: {0}")]
    DayArchiveNotFound(i64),

    #[error("Platform not found: {0}")]
    PlatformNotFound(i64),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::migrate::MigrateError> for MetadataError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MetadataError::MigrationError(e.to_string())
    }
}

impl From<dayarchive_core::Error> for MetadataError {
    fn from(e: dayarchive_core::Error) -> Self {
        MetadataError::InvalidRow(e.to_string())
    }
}

impl MetadataError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetadataError::DatabaseError(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}
