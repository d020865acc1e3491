use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk blob store for uploaded files.
///
/// Each file lives at `{dir}/{file_id}`. Uploads are first written under
/// `{dir}/.staging/` and renamed into place once complete, so a reader never
/// sees a half-written blob.
pub struct Storage {
    dir: PathBuf,
    staging: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        let staging = dir.join(".staging");
        fs::create_dir_all(&staging).await?;
        info!("File storage directory: {}", dir.display());
        Ok(Self { dir, staging })
    }

    /// Path to the stored blob for a file id.
    pub fn file_path(&self, file_id: Uuid) -> PathBuf {
        self.dir.join(file_id.to_string())
    }

    /// Create an empty staging file for an upload in progress.
    pub async fn create_staged(&self) -> Result<(PathBuf, fs::File)> {
        let path = self.staging.join(Uuid::new_v4().to_string());
        let file = fs::File::create(&path).await?;
        Ok((path, file))
    }

    /// Move a finished staging file to its permanent location.
    pub async fn persist(&self, staged: &Path, file_id: Uuid) -> Result<()> {
        fs::rename(staged, self.file_path(file_id)).await?;
        Ok(())
    }

    pub async fn remove_staged(&self, staged: &Path) -> Result<()> {
        match fs::remove_file(staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored blob. Missing blobs are not an error.
    pub async fn delete_file(&self, file_id: Uuid) -> Result<()> {
        let path = self.file_path(file_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted blob {}", file_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", file_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove staging files last modified more than `max_age` ago.
    /// Returns how many were removed.
    pub async fn sweep_staging(&self, max_age: Duration) -> Result<usize> {
        let mut entries = fs::read_dir(&self.staging).await?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            // a finished upload may have been renamed away since read_dir
            let Some(age) = staged_age(&entry.path(), now).await? else {
                continue;
            };
            if age >= max_age {
                self.remove_staged(&entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Time since `path` was last modified, or `None` if it no longer exists.
async fn staged_age(path: &Path, now: SystemTime) -> Result<Option<Duration>> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(now.duration_since(metadata.modified()?).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn staged_upload_is_persisted_under_its_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();

        let (path, mut file) = storage.create_staged().await.unwrap();
        file.write_all(b"hello").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let id = Uuid::new_v4();
        storage.persist(&path, id).await.unwrap();

        assert!(!path.exists());
        assert_eq!(tokio::fs::read(storage.file_path(id)).await.unwrap(), b"hello");

        storage.delete_file(id).await.unwrap();
        assert!(!storage.file_path(id).exists());
        // deleting twice is fine
        storage.delete_file(id).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_honours_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let (path, _file) = storage.create_staged().await.unwrap();

        assert_eq!(storage.sweep_staging(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(path.exists());

        assert_eq!(storage.sweep_staging(Duration::ZERO).await.unwrap(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn vanished_staging_file_has_no_age() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let (path, file) = storage.create_staged().await.unwrap();
        drop(file);

        assert!(staged_age(&path, SystemTime::now()).await.unwrap().is_some());
        storage.persist(&path, Uuid::new_v4()).await.unwrap();
        assert!(staged_age(&path, SystemTime::now()).await.unwrap().is_none());
    }
}
