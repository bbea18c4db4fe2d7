use chrono::{DateTime, Utc};
use models::ItemHash;

/// A stored blob (spec §3.6): a file or directory tracked by its pin set.
#[derive(Debug)]
pub struct StoredFileRow {
    pub hash: ItemHash,
    pub size: i64,
    pub file_type: String,
}

pub async fn upsert_stored_file(
    hash: &ItemHash,
    size: i64,
    file_type: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into stored_files (hash, size, file_type)
        values ($1, $2, $3)
        on conflict (hash) do nothing
        "#,
        hash.as_str(),
        size,
        file_type,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get_stored_file(
    hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<StoredFileRow>> {
    sqlx::query_as!(
        StoredFileRow,
        r#"select hash as "hash: ItemHash", size, file_type from stored_files where hash = $1"#,
        hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await
}

/// Pins a file to the STORE message that owns it. A file may be pinned by
/// many STORE messages (multiple senders storing identical content);
/// deleted only once every pin -- of any kind -- is gone (spec §4.14).
pub async fn add_message_pin(
    file_hash: &ItemHash,
    message_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into message_file_pins (file_hash, message_hash)
        values ($1, $2)
        on conflict do nothing
        "#,
        file_hash.as_str(),
        message_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn remove_message_pin(
    file_hash: &ItemHash,
    message_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        "delete from message_file_pins where file_hash = $1 and message_hash = $2",
        file_hash.as_str(),
        message_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Pins a file on behalf of a protocol transaction (e.g. a chain-ingested
/// batch pointer), independent of any STORE message.
pub async fn add_tx_pin(
    file_hash: &ItemHash,
    tx_hash: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into tx_file_pins (file_hash, tx_hash)
        values ($1, $2)
        on conflict do nothing
        "#,
        file_hash.as_str(),
        tx_hash,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Schedules a file for deletion once `delete_by` has passed, unless a
/// durable pin is added before then (spec §4.14's grace period).
pub async fn add_grace_period_pin(
    file_hash: &ItemHash,
    delete_by: DateTime<Utc>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into grace_period_pins (file_hash, delete_by)
        values ($1, $2)
        on conflict (file_hash) do update set delete_by = excluded.delete_by
        "#,
        file_hash.as_str(),
        delete_by,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Hashes of files with no live pin: no message pin, no tx pin, and any
/// grace-period pins already past `delete_by`. These are the garbage
/// collector's candidates for deletion (spec §4.14).
pub async fn unpinned_files(
    limit: i64,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Vec<ItemHash>> {
    struct Row {
        hash: ItemHash,
    }

    let rows = sqlx::query_as!(
        Row,
        r#"select f.hash as "hash: ItemHash"
        from stored_files f
        where not exists (select 1 from message_file_pins p where p.file_hash = f.hash)
          and not exists (select 1 from tx_file_pins p where p.file_hash = f.hash)
          and not exists (
              select 1 from grace_period_pins p
              where p.file_hash = f.hash and p.delete_by > clock_timestamp()
          )
        limit $1
        "#,
        limit,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.hash).collect())
}

pub async fn delete_stored_file(
    hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from stored_files where hash = $1", hash.as_str())
        .execute(&mut **txn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn file_with_a_live_message_pin_is_not_collectible(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let file = ItemHash::new("f1");
        upsert_stored_file(&file, 1024, "storage", &mut txn).await?;
        add_message_pin(&file, &ItemHash::new("m1"), &mut txn).await?;
        txn.commit().await?;

        let unpinned = unpinned_files(10, &pool).await?;
        assert!(!unpinned.contains(&file));
        Ok(())
    }

    #[sqlx::test]
    async fn removing_the_last_pin_makes_a_file_collectible(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let file = ItemHash::new("f1");
        upsert_stored_file(&file, 1024, "storage", &mut txn).await?;
        add_message_pin(&file, &ItemHash::new("m1"), &mut txn).await?;
        remove_message_pin(&file, &ItemHash::new("m1"), &mut txn).await?;
        txn.commit().await?;

        let unpinned = unpinned_files(10, &pool).await?;
        assert!(unpinned.contains(&file));
        Ok(())
    }

    #[sqlx::test]
    async fn grace_period_pin_blocks_collection_until_it_elapses(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let file = ItemHash::new("f1");
        upsert_stored_file(&file, 1024, "storage", &mut txn).await?;
        add_grace_period_pin(&file, chrono::Utc::now() + chrono::Duration::hours(25), &mut txn).await?;
        txn.commit().await?;

        let unpinned = unpinned_files(10, &pool).await?;
        assert!(!unpinned.contains(&file));

        let mut txn = pool.begin().await?;
        add_grace_period_pin(&file, chrono::Utc::now() - chrono::Duration::hours(1), &mut txn).await?;
        txn.commit().await?;

        let unpinned = unpinned_files(10, &pool).await?;
        assert!(unpinned.contains(&file));
        Ok(())
    }
}
