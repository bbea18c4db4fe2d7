use async_trait::async_trait;
use bytes::Bytes;

/// A narrow interface to a blob backend, mirroring the originating node's
/// `StorageEngine` abstraction: the local cache and the garbage collector
/// both operate against this trait rather than a concrete filesystem or
/// object store.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn read(&self, filename: &str) -> anyhow::Result<Option<Bytes>>;
    async fn write(&self, filename: &str, content: Bytes) -> anyhow::Result<()>;
    async fn delete(&self, filename: &str) -> anyhow::Result<()>;
    async fn exists(&self, filename: &str) -> anyhow::Result<bool>;
}
