//! Content directory keyed by discriminator, with an archive area for
//! soft-deleted files.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ContentStore {
    uploads: PathBuf,

    archive: PathBuf,
}

impl ContentStore {
    pub fn new(uploads: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            uploads: uploads.into(),
            archive: archive.into(),
        }
    }

    #[must_use]
    pub fn upload_path(&self, key: &str) -> PathBuf {
        self.uploads.join(key)
    }

    #[must_use]
    pub fn archive_path(&self, key: &str) -> PathBuf {
        self.archive.join(key)
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.uploads).await?;
        fs::create_dir_all(&self.archive).await?;
        Ok(())
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.uploads).await?;
        fs::write(self.upload_path(key), bytes).await?;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.upload_path(key)).await.ok()
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::metadata(self.upload_path(key)).await.is_ok()
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        fs::remove_file(self.upload_path(key)).await?;
        Ok(())
    }

    /// Move an upload into the archive area (soft delete).
    pub async fn archive(&self, key: &str) -> Result<()> {
        fs::create_dir_all(&self.archive).await?;
        fs::rename(self.upload_path(key), self.archive_path(key)).await?;
        info!("Archived {key}");
        Ok(())
    }

    /// Move an archived file back into the uploads area.
    pub async fn restore(&self, key: &str) -> Result<()> {
        fs::create_dir_all(&self.uploads).await?;
        fs::rename(self.archive_path(key), self.upload_path(key)).await?;
        info!("Restored {key}");
        Ok(())
    }

    pub async fn archived_exists(&self, key: &str) -> bool {
        fs::metadata(self.archive_path(key)).await.is_ok()
    }

    /// Delete the named keys from the archive directory. Missing files are
    /// skipped; individual failures are logged and counted, never fatal.
    pub async fn purge_archived(&self, keys: &[String]) -> PurgeStats {
        let mut stats = PurgeStats::default();

        for key in keys {
            let path = self.archive_path(key);

            if !path_exists(&path).await {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Purged archived file: {key}");
                    stats.files_deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to purge {key}: {e}");
                    stats.errors += 1;
                }
            }
        }

        if stats.files_deleted > 0 {
            info!("Archive purge removed {} files", stats.files_deleted);
        }

        stats
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

#[derive(Debug, Default)]
pub struct PurgeStats {
    pub files_deleted: usize,
    pub errors: usize,
}
