use crate::backend::StorageEngine;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

/// Stores blobs as files under a root directory, one file per `item_hash`.
/// Direct port of the originating node's `FileSystemStorageEngine`, swapping
/// `aiofiles` for `tokio::fs`.
pub struct FileSystemEngine {
    folder: PathBuf,
}

impl FileSystemEngine {
    pub async fn new(folder: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let folder = folder.into();
        if folder.exists() && !folder.is_dir() {
            anyhow::bail!("'{}' exists and is not a directory", folder.display());
        }
        tokio::fs::create_dir_all(&folder).await?;
        Ok(Self { folder })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.folder.join(filename)
    }
}

#[async_trait]
impl StorageEngine for FileSystemEngine {
    async fn read(&self, filename: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.path_for(filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, filename: &str, content: Bytes) -> anyhow::Result<()> {
        let path = self.path_for(filename);
        tokio::fs::write(&path, &content).await?;
        Ok(())
    }

    async fn delete(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.path_for(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, filename: &str) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(filename)).await?)
    }
}

impl std::fmt::Debug for FileSystemEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemEngine")
            .field("folder", &self.folder)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileSystemEngine::new(dir.path()).await.unwrap();

        assert!(!engine.exists("abc").await.unwrap());
        engine.write("abc", Bytes::from_static(b"hello")).await.unwrap();
        assert!(engine.exists("abc").await.unwrap());
        assert_eq!(engine.read("abc").await.unwrap().unwrap(), Bytes::from_static(b"hello"));

        engine.delete("abc").await.unwrap();
        assert!(engine.read("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileSystemEngine::new(dir.path()).await.unwrap();
        engine.delete("does-not-exist").await.unwrap();
    }
}
