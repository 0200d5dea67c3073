//! Archive Configuration
//!
//! ## ArchiveConfig
//!
//! Controls where intermediate artifacts live and how the stages pace themselves:
//!
//! - **staging_dir**: local directory holding raw, zip and checksum artifacts (default: ./data/archives)
//! - **chunk_size**: statements fetched per record store query during population (default: 500)
//! - **finalize_concurrency**: archives compressed concurrently by the finalizer (default: 4)
//! - **public_prefix**: key prefix of published archives in the public store (default: day-archives)
//! - **delimiter**: field delimiter of the raw files (default: ',')
//! - **cleanup_requires_publish**: only delete local zip/checksum files once both
//!   are present in the public store (default: true)
//!
//! ## Usage
//!
//! ```ignore
//! use dayarchive_storage::ArchiveConfig;
//!
//! let config = ArchiveConfig {
//!     staging_dir: "/var/lib/dayarchive".into(),
//!     chunk_size: 2_000,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Local directory for intermediate artifacts
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Statements per record store query (default: 500)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Archives finalized concurrently (default: 4)
    #[serde(default = "default_finalize_concurrency")]
    pub finalize_concurrency: usize,

    /// Key prefix in the public store (default: day-archives)
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Field delimiter, must be a single ASCII character (default: ',')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Gate zip/checksum cleanup on publication (default: true)
    #[serde(default = "default_cleanup_requires_publish")]
    pub cleanup_requires_publish: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            chunk_size: default_chunk_size(),
            finalize_concurrency: default_finalize_concurrency(),
            public_prefix: default_public_prefix(),
            delimiter: default_delimiter(),
            cleanup_requires_publish: default_cleanup_requires_publish(),
        }
    }
}

impl ArchiveConfig {
    /// Reject settings the stages cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.finalize_concurrency == 0 {
            return Err(Error::Config(
                "finalize_concurrency must be greater than 0".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() || self.delimiter == '\n' || self.delimiter == '"' {
            return Err(Error::Config(format!(
                "unsupported delimiter: {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV writer expects.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/archives")
}

fn default_chunk_size() -> u32 {
    500
}

fn default_finalize_concurrency() -> usize {
    4
}

fn default_public_prefix() -> String {
    "day-archives".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_cleanup_requires_publish() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ArchiveConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.delimiter_byte(), b',');
        assert!(config.cleanup_requires_publish);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ArchiveConfig = toml::from_str(
            r#"
            chunk_size = 2000
            delimiter = ";"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.delimiter, ';');
        assert_eq!(config.finalize_concurrency, 4);
        assert_eq!(config.public_prefix, "day-archives");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ArchiveConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ArchiveConfig {
            delimiter: 'é',
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
