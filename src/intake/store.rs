//! File-backed store for accepted documents.
//!
//! The uploads directory is created once at startup by [`FileStore::ensure_dir`];
//! [`FileStore::save`] never creates it, so a missing directory surfaces as a
//! storage error instead of silently reappearing.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;

/// Append-only directory of submitted documents.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ensure the uploads directory exists.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    /// Durably write `bytes` as `file_name` and return the final path.
    ///
    /// Bytes land in a hidden `.part` file first, are synced, then renamed
    /// over the target, so a reader never sees a half-written document.
    pub async fn save(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf, StorageError> {
        check_name(file_name)?;

        let target = self.base_path.join(file_name);
        let partial = self.base_path.join(format!(".{file_name}.part"));

        if let Err(e) = write_synced(&partial, bytes).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::debug!(path = %target.display(), size = bytes.len(), "Document stored");
        Ok(target)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// A stored name must be a single, visible path component.
fn check_name(file_name: &str) -> Result<(), StorageError> {
    let mut components = Path::new(file_name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_normal || file_name.starts_with('.') || file_name.contains(['/', '\\']) {
        return Err(StorageError::InvalidName(file_name.to_string()));
    }
    Ok(())
}
