//! Filesystem blob storage.

use std::path::PathBuf;

use async_trait::async_trait;
use lodge_application::StorageProvider;
use lodge_core::{AppError, AppResult};

/// Stores blobs as files under a configured root directory.
///
/// Keys must stay inside the root: no `..`, no leading `/`, restricted
/// alphabet. Server-generated keys (hex plus a sanitised extension, and
/// the `thumb/` prefix) always satisfy this.
#[derive(Clone)]
pub struct FsStorageProvider {
    root: PathBuf,
}

impl FsStorageProvider {
    /// Creates a provider rooted at `root`; the directory is created on
    /// first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn validate_key(key: &str) -> AppResult<()> {
    let acceptable = !key.is_empty()
        && key.len() <= 128
        && !key.contains("..")
        && !key.starts_with('/')
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '/' | '-' | '_'));
    if !acceptable {
        return Err(AppError::Validation(format!("malformed storage key '{key}'")));
    }
    Ok(())
}

#[async_trait]
impl StorageProvider for FsStorageProvider {
    async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                AppError::Internal(format!("failed to create storage directory: {error}"))
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|error| AppError::Internal(format!("failed to write blob '{key}': {error}")))
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("blob '{key}' not found")))
            }
            Err(error) => Err(AppError::Internal(format!(
                "failed to read blob '{key}': {error}"
            ))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AppError::Internal(format!(
                "failed to delete blob '{key}': {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::validate_key;

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("a key with spaces").is_err());
    }

    #[test]
    fn generated_shapes_are_accepted() {
        assert!(validate_key("0f3a9c.png").is_ok());
        assert!(validate_key("thumb/0f3a9c.png.jpg").is_ok());
    }
}
