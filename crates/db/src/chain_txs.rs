use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;

/// A chain transaction row (spec §3.4): either carries a pointer to a
/// batch of off-chain messages, or a single smart-contract event's
/// structured fields, folded into `content` either way.
#[derive(Debug)]
pub struct ChainTxRow {
    pub hash: String,
    pub chain: String,
    pub height: i64,
    pub tx_datetime: DateTime<Utc>,
    pub publisher: String,
    pub protocol: String,
    pub protocol_version: i32,
    pub content: Json<Value>,
}

/// Inserts the transaction if not already known. Returns whether this is
/// the first time we've seen `hash` -- re-ingestion must be a no-op (spec
/// §4.12).
pub async fn insert_if_new(
    row: &ChainTxRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<bool> {
    let result = sqlx::query!(
        r#"insert into chain_txs
            (hash, chain, height, tx_datetime, publisher, protocol, protocol_version, content)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        on conflict (hash) do nothing
        "#,
        row.hash,
        row.chain,
        row.height,
        row.tx_datetime,
        row.publisher,
        row.protocol,
        row.protocol_version,
        row.content as _,
    )
    .execute(&mut **txn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn known(
    hash: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<bool> {
    let found: Option<i32> = sqlx::query_scalar!(
        r#"select 1 as "found!" from chain_txs where hash = $1"#,
        hash,
    )
    .fetch_optional(&mut **txn)
    .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hash: &str) -> ChainTxRow {
        ChainTxRow {
            hash: hash.to_string(),
            chain: "ETH".to_string(),
            height: 100,
            tx_datetime: chrono::Utc::now(),
            publisher: "0xpublisher".to_string(),
            protocol: "aleph".to_string(),
            protocol_version: 1,
            content: Json(serde_json::json!({"item_hash": "m1"})),
        }
    }

    #[sqlx::test]
    async fn re_ingesting_a_known_hash_is_a_no_op(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        assert!(insert_if_new(&row("tx1"), &mut txn).await?);
        assert!(!insert_if_new(&row("tx1"), &mut txn).await?);
        assert!(known("tx1", &mut txn).await?);
        Ok(())
    }
}
