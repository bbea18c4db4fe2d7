use chrono::{DateTime, Utc};
use models::{Chain, ItemHash, ItemType, MessageOrigin, MessageType};
use uuid::Uuid;

/// A row in the pending queue (spec §3.3): the message envelope plus
/// retry/fetch bookkeeping. `tx` links rows synthesized by the chain event
/// ingestor back to their originating transaction.
#[derive(Debug)]
pub struct PendingRow {
    pub id: Uuid,
    pub item_hash: ItemHash,
    pub sender: String,
    pub chain: Chain,
    pub message_type: MessageType,
    pub item_type: ItemType,
    pub item_content: Option<String>,
    pub signature: Option<String>,
    pub msg_time: f64,
    pub channel: Option<String>,
    pub retries: i32,
    pub next_attempt: DateTime<Utc>,
    pub check_message: bool,
    pub fetched: bool,
    pub reception_time: DateTime<Utc>,
    pub origin: MessageOrigin,
    pub tx_hash: Option<String>,
}

pub struct NewPending<'a> {
    pub item_hash: &'a ItemHash,
    pub sender: &'a str,
    pub chain: Chain,
    pub message_type: MessageType,
    pub item_type: ItemType,
    pub item_content: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub msg_time: f64,
    pub channel: Option<&'a str>,
    pub check_message: bool,
    pub origin: MessageOrigin,
    pub tx_hash: Option<&'a str>,
}

/// Enqueues a pending message. Duplicate `(item_hash)` submissions are
/// coalesced (spec I4): if a pending row for this hash already exists, the
/// insert is a no-op rather than spawning a second worker race.
pub async fn enqueue(
    new: NewPending<'_>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into pending_messages
            (item_hash, sender, chain, message_type, item_type, item_content,
             signature, msg_time, channel, retries, next_attempt, check_message,
             fetched, reception_time, origin, tx_hash)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, clock_timestamp(), $10,
                false, clock_timestamp(), $11, $12)
        on conflict (item_hash) do nothing
        "#,
        new.item_hash.as_str(),
        new.sender,
        new.chain.as_str(),
        new.message_type as MessageType,
        new.item_type as ItemType,
        new.item_content,
        new.signature,
        new.msg_time,
        new.channel,
        new.check_message,
        new.origin as MessageOrigin,
        new.tx_hash,
    )
    .execute(&mut **txn)
    .await?;

    Ok(())
}

/// Claims up to `limit` ready rows (`next_attempt <= now()`) by leasing
/// them: the same statement that selects under `FOR UPDATE SKIP LOCKED`
/// also pushes `next_attempt` forward by `lease`, so the claim is visible
/// to other workers once this transaction commits, not just while it's
/// open. This lets the worker pool release the claiming transaction
/// immediately and do the actual fetch/verify/commit work (which suspends
/// on network and other DB transactions) without holding a lock across
/// those suspension points. A row that finishes before `lease` elapses is
/// deleted outright; one that doesn't (a crashed worker) simply becomes
/// claimable again once `next_attempt` passes.
///
/// Orders by sender round-robin rather than strict FIFO so one noisy
/// sender can't starve the rest of the queue (spec §4.11's fairness
/// requirement).
pub async fn claim_batch(
    limit: i64,
    lease: std::time::Duration,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Vec<PendingRow>> {
    let lease_secs = lease.as_secs_f64();
    sqlx::query_as!(
        PendingRow,
        r#"with ranked as (
            select id, row_number() over (partition by sender order by reception_time asc) as sender_rank
            from pending_messages
            where next_attempt <= clock_timestamp()
        ), picked as (
            select id from ranked order by sender_rank asc limit $1 for update skip locked
        )
        update pending_messages
        set next_attempt = clock_timestamp() + make_interval(secs => $2)
        where id in (select id from picked)
        returning
            id,
            item_hash as "item_hash: ItemHash",
            sender,
            chain as "chain: Chain",
            message_type as "message_type: MessageType",
            item_type as "item_type: ItemType",
            item_content,
            signature,
            msg_time,
            channel,
            retries,
            next_attempt,
            check_message,
            fetched,
            reception_time,
            origin as "origin: MessageOrigin",
            tx_hash
        "#,
        limit,
        lease_secs,
    )
    .fetch_all(&mut **txn)
    .await
}

pub async fn mark_fetched(
    id: Uuid,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("update pending_messages set fetched = true where id = $1", id)
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Bumps `retries` and schedules `next_attempt` at `delay` from now.
/// Capping at the max retry count and converting to a terminal
/// `MaxRetriesExceeded` reject is the worker pool's responsibility, not
/// this accessor's -- it just records the attempt.
pub async fn reschedule(
    id: Uuid,
    delay: std::time::Duration,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    let delay_secs = delay.as_secs_f64();
    sqlx::query!(
        r#"update pending_messages set
            retries = retries + 1,
            next_attempt = clock_timestamp() + make_interval(secs => $2)
        where id = $1
        "#,
        id,
        delay_secs,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Removes a pending row once its message has been committed or
/// terminally rejected.
pub async fn remove(
    id: Uuid,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from pending_messages where id = $1", id)
        .execute(&mut **txn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pending<'a>(item_hash: &'a ItemHash, sender: &'a str) -> NewPending<'a> {
        NewPending {
            item_hash,
            sender,
            chain: Chain::Ethereum,
            message_type: MessageType::Post,
            item_type: ItemType::Inline,
            item_content: Some("{}"),
            signature: None,
            msg_time: 1.0,
            channel: None,
            check_message: true,
            origin: MessageOrigin::P2p,
            tx_hash: None,
        }
    }

    #[sqlx::test]
    async fn claim_batch_leases_rows_and_hides_them_until_lease_expires(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let hash = ItemHash::new("m1");
        let mut txn = pool.begin().await?;
        enqueue(new_pending(&hash, "A"), &mut txn).await?;
        txn.commit().await?;

        let mut txn = pool.begin().await?;
        let claimed = claim_batch(10, std::time::Duration::from_secs(60), &mut txn).await?;
        assert_eq!(claimed.len(), 1);
        txn.commit().await?;

        let mut txn = pool.begin().await?;
        let claimed_again = claim_batch(10, std::time::Duration::from_secs(60), &mut txn).await?;
        assert!(claimed_again.is_empty());
        Ok(())
    }

    #[sqlx::test]
    async fn duplicate_enqueue_of_a_known_hash_is_a_no_op(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let hash = ItemHash::new("m1");
        let mut txn = pool.begin().await?;
        enqueue(new_pending(&hash, "A"), &mut txn).await?;
        enqueue(new_pending(&hash, "B"), &mut txn).await?;
        txn.commit().await?;

        let mut txn = pool.begin().await?;
        let claimed = claim_batch(10, std::time::Duration::from_secs(60), &mut txn).await?;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].sender, "A");
        Ok(())
    }

    #[sqlx::test]
    async fn reschedule_bumps_retries_and_pushes_next_attempt_out(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let hash = ItemHash::new("m1");
        let mut txn = pool.begin().await?;
        enqueue(new_pending(&hash, "A"), &mut txn).await?;
        txn.commit().await?;

        let mut txn = pool.begin().await?;
        let claimed = claim_batch(10, std::time::Duration::from_secs(0), &mut txn).await?;
        let id = claimed[0].id;
        reschedule(id, std::time::Duration::from_secs(3600), &mut txn).await?;
        txn.commit().await?;

        let mut txn = pool.begin().await?;
        let claimed_again = claim_batch(10, std::time::Duration::from_secs(60), &mut txn).await?;
        assert!(claimed_again.is_empty());
        Ok(())
    }
}
