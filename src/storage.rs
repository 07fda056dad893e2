//! Transient upload storage
//!
//! Every upload gets its own storage key (`<uuid>.<ext>`), so concurrent
//! uploads of `leaf.jpg` never share a file. The returned [`StoredUpload`]
//! is removed by [`StoredUpload::release`] once the scan is done, or on drop
//! when a request bails out early, unless the retention policy keeps it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::fs::{self, File};
use uuid::Uuid;

/// Extension used when the client filename has none we accept
const FALLBACK_EXTENSION: &str = "img";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Remove the file once the scan finishes
    Delete,
    /// Leave files in the upload area
    Keep,
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(RetentionPolicy::Delete),
            "keep" => Ok(RetentionPolicy::Keep),
            other => Err(format!("unknown retention policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl UploadStore {
    /// Create the upload directory if needed. Idempotent.
    pub fn open(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::info!("Upload area: {} (retention: {:?})", dir.display(), retention);
        Ok(Self { dir, retention })
    }

    /// Fresh storage path for a client supplied filename
    pub fn allocate(&self, client_name: Option<&str>) -> StoredUpload {
        let key = format!("{}.{}", Uuid::new_v4(), sanitized_extension(client_name));
        StoredUpload {
            path: self.dir.join(key),
            retain: self.retention == RetentionPolicy::Keep,
            released: false,
        }
    }
}

/// An uploaded file on disk
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    retain: bool,
    released: bool,
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the storage path for writing. Fails if it already exists.
    pub async fn create(&self) -> std::io::Result<File> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
    }

    /// Remove the file without blocking the runtime. Retained uploads are
    /// left alone.
    pub async fn release(mut self) {
        self.released = true;
        if self.retain {
            return;
        }
        log_removal(&self.path, fs::remove_file(&self.path).await);
    }
}

impl Drop for StoredUpload {
    /// Fallback for uploads that never reached [`StoredUpload::release`]
    fn drop(&mut self) {
        if self.retain || self.released {
            return;
        }
        log_removal(&self.path, std::fs::remove_file(&self.path));
    }
}

fn log_removal(path: &Path, outcome: std::io::Result<()>) {
    match outcome {
        Ok(()) => tracing::debug!("Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove upload {}: {}", path.display(), e),
    }
}

/// Lower-case ASCII alphanumeric extension of `name`, or the fallback
fn sanitized_extension(name: Option<&str>) -> String {
    name.and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= MAX_EXTENSION_LEN)
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn store(store: &UploadStore, client_name: Option<&str>, bytes: &[u8]) -> StoredUpload {
        let upload = store.allocate(client_name);
        let mut writer = upload.create().await.unwrap();
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
        upload
    }

    #[test]
    fn test_retention_parse() {
        assert_eq!("delete".parse::<RetentionPolicy>(), Ok(RetentionPolicy::Delete));
        assert_eq!(" KEEP ".parse::<RetentionPolicy>(), Ok(RetentionPolicy::Keep));
        assert!("forever".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension(Some("leaf.JPG")), "jpg");
        assert_eq!(sanitized_extension(Some("../../etc/passwd")), "img");
        assert_eq!(sanitized_extension(Some("leaf.j$g")), "img");
        assert_eq!(sanitized_extension(Some("archive.verylongext")), "img");
        assert_eq!(sanitized_extension(None), "img");
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        UploadStore::open(&uploads, RetentionPolicy::Delete).unwrap();
        UploadStore::open(&uploads, RetentionPolicy::Delete).unwrap();
        assert!(uploads.is_dir());
    }

    #[test]
    fn test_same_name_gets_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path(), RetentionPolicy::Delete).unwrap();

        let a = store.allocate(Some("leaf.jpg"));
        let b = store.allocate(Some("leaf.jpg"));
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), Some(dir.path()));
        assert!(a.path().to_string_lossy().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_delete_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::open(dir.path(), RetentionPolicy::Delete).unwrap();

        let upload = store(&uploads, Some("leaf.png"), b"bytes").await;
        let path = upload.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");

        drop(upload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::open(dir.path(), RetentionPolicy::Delete).unwrap();

        let upload = store(&uploads, Some("leaf.jpg"), b"bytes").await;
        let path = upload.path().to_path_buf();

        upload.release().await;
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_release_after_external_removal() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::open(dir.path(), RetentionPolicy::Delete).unwrap();

        let upload = store(&uploads, None, b"bytes").await;
        std::fs::remove_file(upload.path()).unwrap();
        upload.release().await;
    }

    #[tokio::test]
    async fn test_keep_retains_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::open(dir.path(), RetentionPolicy::Keep).unwrap();

        let upload = store(&uploads, Some("leaf.png"), b"bytes").await;
        let path = upload.path().to_path_buf();
        upload.release().await;
        assert!(path.exists());

        let upload = store(&uploads, Some("leaf.png"), b"bytes").await;
        let path = upload.path().to_path_buf();
        drop(upload);
        assert!(path.exists());
    }
}
