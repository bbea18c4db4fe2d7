use crate::coordinator::{self, Trigger};
use chains::VerifierRegistry;
use content::{ContentHandler, ContentRegistry};
use db::pending::PendingRow;
use exponential_backoff::Backoff;
use models::{Message, MessageStatus, RawMessage};
use std::sync::Arc;
use std::time::Duration;
use storage::ContentFetcher;
use uuid::Uuid;

/// The worker pool (spec §4.11): a semaphore-gated batch-dequeue loop, the
/// same overall shape as this codebase's other background server loops --
/// claim a batch under `FOR UPDATE SKIP LOCKED`, release the claiming
/// transaction immediately, then process each claimed row concurrently up
/// to the available permits.
pub struct WorkerPool {
    pool: sqlx::PgPool,
    fetcher: Arc<ContentFetcher>,
    verifiers: Arc<VerifierRegistry>,
    registry: Arc<ContentRegistry>,
    concurrency: usize,
    batch_size: i64,
    poll_interval: Duration,
    lease: Duration,
    max_retries: u32,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl WorkerPool {
    pub fn new(
        pool: sqlx::PgPool,
        fetcher: Arc<ContentFetcher>,
        verifiers: Arc<VerifierRegistry>,
        registry: Arc<ContentRegistry>,
        concurrency: usize,
        batch_size: i64,
        poll_interval: Duration,
        lease: Duration,
        max_retries: u32,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            pool,
            fetcher,
            verifiers,
            registry,
            concurrency,
            batch_size,
            poll_interval,
            lease,
            max_retries,
            backoff_min,
            backoff_max,
        }
    }

    /// Runs until `shutdown` resolves. Each iteration claims up to
    /// `batch_size` ready rows, spawns up to `concurrency` of them at once,
    /// and sleeps a jittered `poll_interval` when nothing was claimed.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));
        tokio::pin!(shutdown);

        loop {
            let batch = tokio::select! {
                batch = self.claim_batch() => batch,
                () = &mut shutdown => break,
            };

            let rows = match batch {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::error!(?err, "failed to claim pending messages (will retry)");
                    Vec::new()
                }
            };

            if rows.is_empty() {
                // Jitter by +/-10% so many idle workers don't all re-poll
                // in lockstep.
                let jitter = 0.9 + rand::random::<f64>() * 0.2;
                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval.mul_f64(jitter)) => (),
                    () = &mut shutdown => break,
                }
                continue;
            }

            for row in rows {
                let permit = semaphore.clone().acquire_owned().await.unwrap();
                let pool = self.pool.clone();
                let fetcher = self.fetcher.clone();
                let verifiers = self.verifiers.clone();
                let registry = self.registry.clone();
                let max_retries = self.max_retries;
                let backoff_min = self.backoff_min;
                let backoff_max = self.backoff_max;

                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = process_one(&row, &fetcher, &verifiers, &registry, &pool).await;
                    if let Err(err) = finalize(&row, outcome, max_retries, backoff_min, backoff_max, &pool).await
                    {
                        tracing::error!(item_hash = %row.item_hash, ?err, "failed to finalize pending message");
                    }
                });
            }
        }

        tracing::info!("worker pool signaled to stop and is awaiting in-flight messages");
        let _ = semaphore.acquire_many(self.concurrency as u32).await;
    }

    async fn claim_batch(&self) -> sqlx::Result<Vec<PendingRow>> {
        let mut txn = self.pool.begin().await?;
        let rows = db::pending::claim_batch(self.batch_size, self.lease, &mut txn).await?;
        txn.commit().await?;
        Ok(rows)
    }
}

enum Outcome {
    Committed,
    Retry(models::MessageProcessingError),
    Reject(models::MessageProcessingError),
}

/// Runs one pending row through fetch, signature verification, and commit
/// (spec §4.11). Network and database work is split the same way the
/// commit coordinator expects: fetching happens here, outside any
/// transaction; `coordinator::commit` opens the one transaction the rest
/// of the pipeline runs inside.
async fn process_one(
    row: &PendingRow,
    fetcher: &Arc<ContentFetcher>,
    verifiers: &VerifierRegistry,
    registry: &ContentRegistry,
    pool: &sqlx::PgPool,
) -> Outcome {
    let message = match crate::fetcher::fetch(row, fetcher).await {
        Ok(message) => message,
        Err(err) => {
            return if err.is_retryable() {
                Outcome::Retry(err)
            } else {
                Outcome::Reject(err)
            }
        }
    };

    if row.check_message {
        let raw = raw_envelope(row);
        let outcome = verifiers.verify(&raw, row.origin);
        if !outcome.is_acceptable() {
            return Outcome::Reject(models::MessageProcessingError::InvalidSignature);
        }
    }

    let handler = registry.get(message.message_type);
    if let Err(err) = handler.fetch_related_content(&message).await {
        let retryable = err.is_retryable();
        let err = match err {
            content::HandlerError::Processing(e) => e,
            content::HandlerError::Db(e) => models::MessageProcessingError::Internal(e.to_string()),
        };
        return if retryable {
            Outcome::Retry(err)
        } else {
            Outcome::Reject(err)
        };
    }

    let trigger = Trigger::Pending(row.id, row.tx_hash.as_deref());
    match coordinator::commit(&message, registry, trigger, pool).await {
        Ok(()) => Outcome::Committed,
        Err(err) if err.is_retryable() => Outcome::Retry(err.into_processing()),
        Err(err) => Outcome::Reject(err.into_processing()),
    }
}

fn raw_envelope(row: &PendingRow) -> RawMessage {
    RawMessage {
        item_hash: row.item_hash.clone(),
        sender: row.sender.clone(),
        chain: row.chain.clone(),
        message_type: row.message_type,
        item_type: row.item_type,
        item_content: row.item_content.clone(),
        signature: row.signature.clone(),
        time: row.msg_time,
        channel: row.channel.clone(),
    }
}

/// Applies the rescheduling policy (spec §4.10/§4.11): a successful commit
/// needs no further action (the coordinator already removed the pending
/// row); a retryable failure is rescheduled with exponential back-off
/// unless `max_retries` is exhausted, in which case it becomes a terminal
/// `MaxRetriesExceeded` reject.
async fn finalize(
    row: &PendingRow,
    outcome: Outcome,
    max_retries: u32,
    backoff_min: Duration,
    backoff_max: Duration,
    pool: &sqlx::PgPool,
) -> sqlx::Result<()> {
    match outcome {
        Outcome::Committed => Ok(()),
        Outcome::Retry(err) => {
            let retries = row.retries.max(0) as u32;
            if retries >= max_retries {
                reject(row.id, &row.item_hash, models::MessageProcessingError::MaxRetriesExceeded, pool)
                    .await
            } else {
                let backoff = Backoff::new(max_retries, backoff_min, backoff_max);
                let delay = backoff
                    .into_iter()
                    .nth(retries as usize)
                    .flatten()
                    .unwrap_or(backoff_max);
                tracing::debug!(item_hash = %row.item_hash, ?err, ?delay, "rescheduling pending message");
                let mut txn = pool.begin().await?;
                db::pending::reschedule(row.id, delay, &mut txn).await?;
                txn.commit().await
            }
        }
        Outcome::Reject(err) => reject(row.id, &row.item_hash, err, pool).await,
    }
}

async fn reject(
    id: Uuid,
    item_hash: &models::ItemHash,
    err: models::MessageProcessingError,
    pool: &sqlx::PgPool,
) -> sqlx::Result<()> {
    tracing::warn!(item_hash = %item_hash, %err, "rejecting pending message");
    let mut txn = pool.begin().await?;
    db::messages::upsert_status(
        item_hash,
        MessageStatus::Rejected,
        Some(err.error_code()),
        err.details().as_ref(),
        &mut txn,
    )
    .await?;
    db::pending::remove(id, &mut txn).await?;
    txn.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Chain, ItemType, MessageOrigin, MessageType};

    #[test]
    fn raw_envelope_round_trips_pending_row_fields() {
        let row = PendingRow {
            id: Uuid::new_v4(),
            item_hash: "h".into(),
            sender: "0xa".to_string(),
            chain: Chain::Test,
            message_type: MessageType::Post,
            item_type: ItemType::Inline,
            item_content: Some("{}".to_string()),
            signature: None,
            msg_time: 1.0,
            channel: None,
            retries: 0,
            next_attempt: chrono::Utc::now(),
            check_message: false,
            fetched: false,
            reception_time: chrono::Utc::now(),
            origin: MessageOrigin::Api,
            tx_hash: None,
        };

        let raw = raw_envelope(&row);
        assert_eq!(raw.item_hash, row.item_hash);
        assert_eq!(raw.sender, row.sender);
    }
}
