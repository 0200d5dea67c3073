//! Configuration file for archivectl
//!
//! ```toml
//! database = "./data/archive.db"
//!
//! [public]
//! bucket = "dsa-day-archives"      # or: local_dir = "./data/public"
//!
//! [archive]
//! staging_dir = "./data/archives"
//! chunk_size = 2000
//! ```
//!
//! Every value can be overridden on the command line or through the matching
//! `DAYARCHIVE_*` environment variable.

use anyhow::{bail, Context, Result};
use dayarchive_storage::ArchiveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding statements and archive rows
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub public: PublicStoreConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Where published archives go. A local directory wins over a bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicStoreConfig {
    pub bucket: Option<String>,
    pub local_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            public: PublicStoreConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("./data/archive.db")
}

impl Config {
    /// Load the given file, or start from defaults when no file was given.
    ///
    /// A path that was given but does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.database, PathBuf::from("./data/archive.db"));
        assert_eq!(config.public, PublicStoreConfig::default());
        assert_eq!(config.archive.chunk_size, 500);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/archivectl.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/archivectl.toml"));
    }

    #[test]
    fn test_load_nested_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archivectl.toml");
        std::fs::write(
            &path,
            r#"
            database = "/var/lib/dayarchive/archive.db"

            [public]
            bucket = "dsa-day-archives"

            [archive]
            chunk_size = 2000
            delimiter = ";"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/dayarchive/archive.db"));
        assert_eq!(config.public.bucket.as_deref(), Some("dsa-day-archives"));
        assert_eq!(config.public.local_dir, None);
        assert_eq!(config.archive.chunk_size, 2000);
        assert_eq!(config.archive.delimiter, ';');
        assert_eq!(config.archive.public_prefix, "day-archives");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "chunk_size = [").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
