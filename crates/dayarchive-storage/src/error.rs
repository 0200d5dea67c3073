//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - `Validation`: the requested day is not in the past. Fatal, never retried.
//! - `Conflict`: the day already has an archive matrix. The trigger was already
//!   handled and must not be retried blindly.
//!
//! ### Transient Errors
//! - `TransientIo`: the staging area, public store or record store failed
//!   mid-stage. The whole stage is safe to retry for the affected jobs.
//! - `Io`, `ObjectStoreError`: low-level failures, also retryable
//!
//! ### Integrity Errors
//! - `DataIntegrity`: a checksum does not match its archive. Fatal, the archive
//!   is never published.
//!
//! ### Other
//! - `MetadataError`: tracking store failure not covered above
//! - `Archive`: zip encoding failed
//! - `Config`: invalid configuration

use chrono::NaiveDate;
use dayarchive_metadata::MetadataError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Metadata error: {0}")]
    MetadataError(MetadataError),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<MetadataError> for Error {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::DayAlreadyArchived(date) => Error::already_archived(date),
            MetadataError::CompletedArchivesExist(date) => Error::Conflict(format!(
                "day {} has completed archives and cannot be discarded",
                date
            )),
            other => Error::MetadataError(other),
        }
    }
}

impl Error {
    pub(crate) fn already_archived(date: NaiveDate) -> Self {
        Error::Conflict(format!(
            "A day archive for the date: {} already exists, already archived for this date",
            date
        ))
    }

    /// Whether re-running the failed stage could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransientIo(_) | Error::Io(_) | Error::ObjectStoreError(_) => true,
            Error::MetadataError(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_already_archived_maps_to_conflict() {
        let date = NaiveDate::from_ymd_opt(2023, 8, 8).unwrap();
        let err: Error = MetadataError::DayAlreadyArchived(date).into();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.to_string().contains("2023-08-08"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::TransientIo("staging unavailable".into()).is_retryable());
        assert!(!Error::DataIntegrity("mismatch".into()).is_retryable());
        assert!(!Error::Validation("future".into()).is_retryable());
    }
}
