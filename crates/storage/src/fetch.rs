use crate::backend::StorageEngine;
use crate::error::StorageError;
use crate::ipfs::IpfsClient;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{FutureExt, Shared};
use models::{HashFamily, ItemHash, ItemType};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Where a fetched blob actually came from, recorded for observability per
/// spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Inline,
    Local,
    P2p,
    Ipfs,
}

/// The network side of content resolution, implemented by the node's p2p
/// layer. Kept as a trait here so `storage` doesn't depend on the transport.
#[async_trait]
pub trait P2pContentSource: Send + Sync {
    async fn fetch(&self, hash: &ItemHash) -> anyhow::Result<Option<Bytes>>;
}

type FetchOutput = Arc<Result<(Bytes, FetchSource), StorageError>>;
type BoxedFetchFuture = Pin<Box<dyn Future<Output = FetchOutput> + Send + 'static>>;

/// Resolves content by hash from a local cache, the p2p network, or an IPFS
/// gateway, deduplicating concurrent requests for the same hash into a
/// single in-flight fetch -- the single-flight behavior required by spec
/// §4.1, modeled on the dedup-by-shared-future pattern used elsewhere in
/// this codebase for spec lookups.
pub struct ContentFetcher {
    local: Arc<dyn StorageEngine>,
    p2p: Option<Arc<dyn P2pContentSource>>,
    ipfs: Option<IpfsClient>,
    inflight: Arc<Mutex<HashMap<ItemHash, Shared<BoxedFetchFuture>>>>,
}

impl ContentFetcher {
    pub fn new(
        local: Arc<dyn StorageEngine>,
        p2p: Option<Arc<dyn P2pContentSource>>,
        ipfs: Option<IpfsClient>,
    ) -> Self {
        Self {
            local,
            p2p,
            ipfs,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolves `hash`, verifying the result hashes correctly before
    /// returning it. `item_type` hints which remote source to prefer.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(
        &self,
        hash: &ItemHash,
        item_type: ItemType,
    ) -> Result<(Bytes, FetchSource), StorageError> {
        if let Some(bytes) = self
            .local
            .read(hash.as_str())
            .await
            .map_err(StorageError::Backend)?
        {
            return Ok((bytes, FetchSource::Local));
        }

        let shared = self.shared_future_for(hash.clone(), item_type);
        let result = shared.await;
        Arc::try_unwrap(result).unwrap_or_else(|arc| (*arc).clone())
    }

    fn shared_future_for(
        &self,
        hash: ItemHash,
        item_type: ItemType,
    ) -> Shared<BoxedFetchFuture> {
        let mut guard = self.inflight.lock().unwrap();
        if let Some(existing) = guard.get(&hash) {
            tracing::debug!(%hash, "fetch already in flight, joining");
            return existing.clone();
        }

        let local = self.local.clone();
        let p2p = self.p2p.clone();
        let ipfs = self.ipfs.clone();
        let fetch_hash = hash.clone();
        let inflight = self.inflight.clone();
        let cleanup_hash = hash.clone();

        let future: BoxedFetchFuture = Box::pin(async move {
            let result =
                Arc::new(resolve_remote(&fetch_hash, item_type, &local, p2p.as_deref(), ipfs.as_ref()).await);
            inflight.lock().unwrap().remove(&cleanup_hash);
            result
        });
        let shared = future.shared();
        guard.insert(hash, shared.clone());
        shared
    }
}

async fn resolve_remote(
    hash: &ItemHash,
    item_type: ItemType,
    local: &Arc<dyn StorageEngine>,
    p2p: Option<&dyn P2pContentSource>,
    ipfs: Option<&IpfsClient>,
) -> Result<(Bytes, FetchSource), StorageError> {
    let candidate = match item_type {
        ItemType::Ipfs => fetch_ipfs(hash, ipfs).await?.or(fetch_p2p(hash, p2p).await?),
        _ => fetch_p2p(hash, p2p).await?.or(fetch_ipfs(hash, ipfs).await?),
    };

    let (bytes, source) = candidate.ok_or_else(|| StorageError::NotFound(hash.clone()))?;

    if hash.guess_family() == HashFamily::Sha256 && !hash.matches_sha256(&bytes) {
        return Err(StorageError::HashMismatch { hash: hash.clone() });
    }

    local
        .write(hash.as_str(), bytes.clone())
        .await
        .map_err(StorageError::Backend)?;

    Ok((bytes, source))
}

async fn fetch_p2p(
    hash: &ItemHash,
    p2p: Option<&dyn P2pContentSource>,
) -> Result<Option<(Bytes, FetchSource)>, StorageError> {
    let Some(p2p) = p2p else { return Ok(None) };
    let bytes = p2p.fetch(hash).await.map_err(StorageError::Backend)?;
    Ok(bytes.map(|b| (b, FetchSource::P2p)))
}

async fn fetch_ipfs(
    hash: &ItemHash,
    ipfs: Option<&IpfsClient>,
) -> Result<Option<(Bytes, FetchSource)>, StorageError> {
    let Some(ipfs) = ipfs else { return Ok(None) };
    let bytes = ipfs.cat(hash.as_str()).await.map_err(StorageError::Backend)?;
    Ok(bytes.map(|b| (b, FetchSource::Ipfs)))
}
