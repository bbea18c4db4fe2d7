use models::ItemHash;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("content {0} is not available from any configured source")]
    NotFound(ItemHash),

    #[error("content fetched for {hash} does not hash to the expected value")]
    HashMismatch { hash: ItemHash },

    #[error("fetch of {0} timed out")]
    Timeout(ItemHash),

    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StorageError {
    /// Everything except a hash mismatch is worth retrying -- a mismatch
    /// means the content will never be correct, however many times we ask.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::HashMismatch { .. })
    }
}

/// Needed so a single resolved fetch can be handed to every joined waiter
/// (see `ContentFetcher::fetch`'s `Arc::try_unwrap` fallback) without
/// re-running the fetch.
impl Clone for StorageError {
    fn clone(&self) -> Self {
        match self {
            StorageError::NotFound(h) => StorageError::NotFound(h.clone()),
            StorageError::HashMismatch { hash } => StorageError::HashMismatch { hash: hash.clone() },
            StorageError::Timeout(h) => StorageError::Timeout(h.clone()),
            StorageError::Backend(e) => StorageError::Backend(anyhow::anyhow!(e.to_string())),
        }
    }
}
