//! Remote attachment store addressed by content hash.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::AttachmentError;

/// Store holding attachment bytes under `<base>/<content-hash>`.
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Location of `upload_hash` on the store, for logging.
    fn remote_path(&self, upload_hash: &str) -> PathBuf;

    /// Copy the file for `upload_hash` to `destination`, returning bytes written.
    ///
    /// A missing file is reported as [`AttachmentError::NotFound`].
    async fn fetch(&self, upload_hash: &str, destination: &Path) -> Result<u64, AttachmentError>;
}

/// Remote store reachable as a directory, such as a mounted share.
#[derive(Debug, Clone)]
pub struct FsRemoteStore {
    base: PathBuf,
}

impl FsRemoteStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl RemoteFileStore for FsRemoteStore {
    fn remote_path(&self, upload_hash: &str) -> PathBuf {
        self.base.join(upload_hash)
    }

    async fn fetch(&self, upload_hash: &str, destination: &Path) -> Result<u64, AttachmentError> {
        let source = self.remote_path(upload_hash);
        let mut reader = File::open(&source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AttachmentError::NotFound {
                    path: source.clone(),
                }
            } else {
                AttachmentError::copy_failed(source.clone(), destination.to_path_buf(), e)
            }
        })?;

        let dest_file = File::create(destination).await.map_err(|e| {
            AttachmentError::copy_failed(source.clone(), destination.to_path_buf(), e)
        })?;
        let mut writer = BufWriter::new(dest_file);

        let bytes = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| AttachmentError::copy_failed(source.clone(), destination.to_path_buf(), e))?;
        writer
            .flush()
            .await
            .map_err(|e| AttachmentError::copy_failed(source, destination.to_path_buf(), e))?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_copies_bytes() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        tokio::fs::write(remote.path().join("abc123"), b"png bytes")
            .await
            .unwrap();

        let store = FsRemoteStore::new(remote.path());
        let dest = local.path().join("screenshot.png");
        let bytes = store.fetch("abc123", &dest).await.unwrap();

        assert_eq!(bytes, 9);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let store = FsRemoteStore::new(remote.path());

        let err = store
            .fetch("missing", &local.path().join("x.txt"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!local.path().join("x.txt").exists());
    }

    #[test]
    fn test_remote_path() {
        let store = FsRemoteStore::new("/srv/supportpal/uploads");
        assert_eq!(
            store.remote_path("def456"),
            PathBuf::from("/srv/supportpal/uploads/def456")
        );
    }
}
