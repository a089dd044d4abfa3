use crate::error::{Result, StoreError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use tokio::io::AsyncRead;

pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Path-addressed storage for raster and vector payloads.
///
/// Keys are relative, `/`-separated paths such as `rasters/12/header.json`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Stream a payload without buffering it first.
    async fn reader(&self, key: &str) -> Result<BlobReader>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Store `bytes` under `{prefix}/{sha256}.{extension}` and return the key.
    /// Existing identical payloads are not rewritten.
    async fn put_content_addressed(
        &self,
        prefix: &str,
        extension: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let digest = Sha256::digest(&bytes);
        let key = format!("{}/{:x}.{extension}", prefix.trim_end_matches('/'), digest);
        if !self.exists(&key).await? {
            self.put(&key, bytes).await?;
        }
        Ok(key)
    }
}

/// Reject keys that could escape the store root.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Blob store rooted at a directory; writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }
}

fn not_found(key: &str, err: std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        err.into()
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|err| not_found(key, err))
    }

    async fn reader(&self, key: &str) -> Result<BlobReader> {
        let path = self.path_for(key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| not_found(key, err))?;
        Ok(Box::pin(file))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Blob store kept in memory; used by tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn blobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Other("blob store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.blobs()?.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        self.blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn reader(&self, key: &str) -> Result<BlobReader> {
        let bytes = self.get(key).await?;
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.blobs()?.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.blobs()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/abs", "a/../b", "a//b", "a\\b", "./a"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
        assert!(validate_key("rasters/1/header.json").is_ok());
    }

    #[tokio::test]
    async fn fs_store_round_trips_and_streams() {
        let temp = TempDir::new().expect("tempdir");
        let store = FsBlobStore::new(temp.path());

        store
            .put("vectors/1/data.geojson", b"{}".to_vec())
            .await
            .expect("put");
        assert!(store.exists("vectors/1/data.geojson").await.expect("exists"));
        assert_eq!(store.get("vectors/1/data.geojson").await.expect("get"), b"{}");

        let mut reader = store.reader("vectors/1/data.geojson").await.expect("reader");
        let mut streamed = Vec::new();
        reader.read_to_end(&mut streamed).await.expect("read");
        assert_eq!(streamed, b"{}");

        assert!(store.delete("vectors/1/data.geojson").await.expect("delete"));
        assert!(!store.delete("vectors/1/data.geojson").await.expect("delete again"));
        assert!(matches!(
            store.get("vectors/1/data.geojson").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn content_addressing_deduplicates() {
        let store = MemoryBlobStore::new();
        let first = store
            .put_content_addressed("uploads", "zip", b"payload".to_vec())
            .await
            .expect("put");
        let second = store
            .put_content_addressed("uploads/", "zip", b"payload".to_vec())
            .await
            .expect("put");
        assert_eq!(first, second);
        assert!(first.starts_with("uploads/"));
        assert!(first.ends_with(".zip"));
        assert_eq!(store.keys().len(), 1);
    }
}
