use models::MessageStatus;
use std::sync::Arc;
use std::time::Duration;
use storage::StorageEngine;

/// Periodic sweep of unpinned blobs (spec §4.14): delete anything
/// `db::files::unpinned_files` reports as having no live pin, then flip any
/// STORE message that's REMOVING and now has no pin left to REMOVED.
pub struct GarbageCollector {
    pool: sqlx::PgPool,
    local: Arc<dyn StorageEngine>,
    interval: Duration,
    batch_size: i64,
}

impl GarbageCollector {
    pub fn new(pool: sqlx::PgPool, local: Arc<dyn StorageEngine>, interval: Duration, batch_size: i64) -> Self {
        Self {
            pool,
            local,
            interval,
            batch_size,
        }
    }

    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            if let Err(err) = self.sweep_once().await {
                tracing::error!(?err, "garbage collection sweep failed (will retry)");
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => (),
                () = &mut shutdown => break,
            }
        }
    }

    pub async fn sweep_once(&self) -> sqlx::Result<usize> {
        let candidates = db::files::unpinned_files(self.batch_size, &self.pool).await?;

        let mut deleted = 0;
        for hash in &candidates {
            if let Err(err) = self.local.delete(hash.as_str()).await {
                tracing::warn!(item_hash = %hash, ?err, "failed to delete blob from storage backend");
                continue;
            }

            let mut txn = self.pool.begin().await?;
            db::files::delete_stored_file(hash, &mut txn).await?;

            // A STORE message referencing this blob may now be fully
            // cleaned up: its own hash is usually the blob's hash (the
            // item_hash of the STORE message that first pinned it), so a
            // message in REMOVING with no pin left transitions to REMOVED.
            if let Some(status) = db::messages::get_status_in_txn(hash, &mut txn).await? {
                if status.status == MessageStatus::Removing {
                    db::messages::upsert_status(hash, MessageStatus::Removed, None, None, &mut txn)
                        .await?;
                }
            }
            txn.commit().await?;
            deleted += 1;
        }

        if !candidates.is_empty() {
            tracing::info!(candidates = candidates.len(), deleted, "garbage collection sweep completed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageEngine for FakeBackend {
        async fn read(&self, _filename: &str) -> anyhow::Result<Option<Bytes>> {
            Ok(None)
        }
        async fn write(&self, _filename: &str, _content: Bytes) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete(&self, filename: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(filename.to_string());
            Ok(())
        }
        async fn exists(&self, _filename: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn backend_records_deletions() {
        let backend = FakeBackend::default();
        assert!(backend.deleted.lock().unwrap().is_empty());
    }
}
