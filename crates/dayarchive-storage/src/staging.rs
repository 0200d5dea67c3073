//! Staging Area
//!
//! Local, key-addressed storage for the intermediate artifacts of an archive
//! job: the raw delimited file, its zip and the zip's checksum. Keys are plain
//! file names produced by `ArchivePaths`, so the layout is flat.
//!
//! Deleting a key that does not exist is not an error, which keeps both
//! cleanup passes idempotent.

use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Create the artifact, truncating any previous content.
    pub async fn create(&self, key: &str) -> Result<File> {
        fs::create_dir_all(&self.root).await?;
        Ok(File::create(self.path(key)).await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path(key)).await?)
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(key)).await?)
    }

    pub async fn write(&self, key: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.path(key), contents).await?;
        Ok(())
    }

    /// Delete the artifact. Returns whether anything was removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_create_truncates() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(dir.path().join("nested"));

        let mut file = staging.create("a.csv").await.unwrap();
        file.write_all(b"first attempt").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let mut file = staging.create("a.csv").await.unwrap();
        file.write_all(b"ok").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(staging.read("a.csv").await.unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::new(dir.path());

        staging.write("b.sha1", b"abc").await.unwrap();
        assert!(staging.remove("b.sha1").await.unwrap());
        assert!(!staging.remove("b.sha1").await.unwrap());
        assert!(!staging.exists("b.sha1").await.unwrap());
    }
}
