use chrono::{DateTime, Utc};
use models::{Chain, ErrorCode, ItemHash, ItemType, MessageStatus, MessageType};
use serde_json::Value;
use sqlx::types::Json;

/// A committed message row, as stored in `messages`. Immutable once
/// inserted (spec §3.1, invariant I3).
#[derive(Debug)]
pub struct MessageRow {
    pub item_hash: ItemHash,
    pub sender: String,
    pub chain: Chain,
    pub message_type: MessageType,
    pub item_type: ItemType,
    pub item_content: Option<String>,
    pub signature: Option<String>,
    pub time: f64,
    pub channel: Option<String>,
    pub content: Json<Value>,
    pub size: i64,
}

/// Inserts a message, coalescing duplicate submissions on `item_hash`
/// (spec I4): a second insert of an already-known hash is a silent no-op.
pub async fn insert(
    row: &MessageRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into messages
            (item_hash, sender, chain, message_type, item_type, item_content,
             signature, msg_time, channel, content, size)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        on conflict (item_hash) do nothing
        "#,
        row.item_hash.as_str(),
        row.sender,
        row.chain.as_str(),
        row.message_type as MessageType,
        row.item_type as ItemType,
        row.item_content,
        row.signature,
        row.time,
        row.channel,
        row.content as _,
        row.size,
    )
    .execute(&mut **txn)
    .await?;

    Ok(())
}

pub async fn get(
    item_hash: &ItemHash,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<MessageRow>> {
    sqlx::query_as!(
        MessageRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            sender,
            chain as "chain: Chain",
            message_type as "message_type: MessageType",
            item_type as "item_type: ItemType",
            item_content,
            signature,
            msg_time as "time",
            channel,
            content as "content: Json<Value>",
            size
        from messages
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(pool)
    .await
}

/// Same as `get`, against an open transaction. The FORGET handler (spec
/// §4.9) looks up its targets inside the commit coordinator's transaction.
pub async fn get_in_txn(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<MessageRow>> {
    sqlx::query_as!(
        MessageRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            sender,
            chain as "chain: Chain",
            message_type as "message_type: MessageType",
            item_type as "item_type: ItemType",
            item_content,
            signature,
            msg_time as "time",
            channel,
            content as "content: Json<Value>",
            size
        from messages
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await
}

/// One row of `message_status`: exactly one per known `item_hash` (spec
/// §3.2).
#[derive(Debug)]
pub struct StatusRow {
    pub item_hash: ItemHash,
    pub status: MessageStatus,
    pub reception_time: DateTime<Utc>,
    pub last_transition_time: Option<DateTime<Utc>>,
    pub error_code: Option<i32>,
    pub details: Option<Json<Value>>,
}

pub async fn upsert_status(
    item_hash: &ItemHash,
    status: MessageStatus,
    error_code: Option<ErrorCode>,
    details: Option<&Value>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into message_status (item_hash, status, reception_time, last_transition_time, error_code, details)
        values ($1, $2, clock_timestamp(), clock_timestamp(), $3, $4)
        on conflict (item_hash) do update set
            status = excluded.status,
            last_transition_time = clock_timestamp(),
            error_code = excluded.error_code,
            details = excluded.details
        "#,
        item_hash.as_str(),
        status as MessageStatus,
        error_code.map(|e| e.as_i32()),
        details.map(Json) as _,
    )
    .execute(&mut **txn)
    .await?;

    Ok(())
}

pub async fn get_status(
    item_hash: &ItemHash,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<StatusRow>> {
    sqlx::query_as!(
        StatusRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            status as "status: MessageStatus",
            reception_time,
            last_transition_time,
            error_code,
            details as "details: Json<Value>"
        from message_status
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(pool)
    .await
}

pub async fn get_status_in_txn(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<StatusRow>> {
    sqlx::query_as!(
        StatusRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            status as "status: MessageStatus",
            reception_time,
            last_transition_time,
            error_code,
            details as "details: Json<Value>"
        from message_status
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Chain, ErrorCode, ItemType, MessageType};

    fn sample(item_hash: &str) -> MessageRow {
        MessageRow {
            item_hash: ItemHash::new(item_hash),
            sender: "0xsender".to_string(),
            chain: Chain::Ethereum,
            message_type: MessageType::Post,
            item_type: ItemType::Inline,
            item_content: Some("{}".to_string()),
            signature: Some("sig".to_string()),
            time: 1.0,
            channel: None,
            content: Json(serde_json::json!({"content": "hello"})),
            size: 7,
        }
    }

    #[sqlx::test]
    async fn insert_then_get_round_trips(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        insert(&sample("h1"), &mut txn).await?;

        let row = get_in_txn(&ItemHash::new("h1"), &mut txn).await?.expect("row inserted");
        assert_eq!(row.sender, "0xsender");
        assert_eq!(row.message_type, MessageType::Post);
        Ok(())
    }

    #[sqlx::test]
    async fn second_insert_of_known_hash_is_a_no_op(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let mut first = sample("h1");
        insert(&first, &mut txn).await?;

        first.sender = "0xother".to_string();
        insert(&first, &mut txn).await?;

        let row = get_in_txn(&ItemHash::new("h1"), &mut txn).await?.expect("row inserted");
        assert_eq!(row.sender, "0xsender");
        Ok(())
    }

    #[sqlx::test]
    async fn upsert_status_transitions_and_tracks_error_code(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let hash = ItemHash::new("h1");

        upsert_status(&hash, MessageStatus::Pending, None, None, &mut txn).await?;
        let status = get_status_in_txn(&hash, &mut txn).await?.expect("status row");
        assert_eq!(status.status, MessageStatus::Pending);
        assert!(status.error_code.is_none());

        upsert_status(&hash, MessageStatus::Rejected, Some(ErrorCode::BalanceInsufficient), None, &mut txn)
            .await?;
        let status = get_status_in_txn(&hash, &mut txn).await?.expect("status row");
        assert_eq!(status.status, MessageStatus::Rejected);
        assert_eq!(status.error_code, Some(ErrorCode::BalanceInsufficient.as_i32()));
        Ok(())
    }
}
