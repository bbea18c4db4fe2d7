use models::ItemHash;

/// Asserts that transaction `tx_hash` carries message `item_hash` (spec
/// §3.5). Many-to-many: a message may be confirmed by several
/// transactions (e.g. resubmitted across chains), and a transaction may
/// confirm many messages (a batch pointer).
pub async fn add(
    item_hash: &ItemHash,
    tx_hash: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into confirmations (item_hash, tx_hash)
        values ($1, $2)
        on conflict do nothing
        "#,
        item_hash.as_str(),
        tx_hash,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn is_confirmed(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<bool> {
    let found: Option<i32> = sqlx::query_scalar!(
        r#"select 1 as "found!" from confirmations where item_hash = $1 limit 1"#,
        item_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_txs::{self, ChainTxRow};
    use crate::messages;
    use sqlx::types::Json;

    async fn seed_message(item_hash: &ItemHash, txn: &mut sqlx::Transaction<'_, sqlx::Postgres>) {
        messages::insert(
            &messages::MessageRow {
                item_hash: item_hash.clone(),
                sender: "0xsender".to_string(),
                chain: models::Chain::Ethereum,
                message_type: models::MessageType::Post,
                item_type: models::ItemType::Inline,
                item_content: Some("{}".to_string()),
                signature: None,
                time: 1.0,
                channel: None,
                content: Json(serde_json::json!({})),
                size: 2,
            },
            txn,
        )
        .await
        .unwrap();
    }

    async fn seed_tx(hash: &str, txn: &mut sqlx::Transaction<'_, sqlx::Postgres>) {
        chain_txs::insert_if_new(
            &ChainTxRow {
                hash: hash.to_string(),
                chain: "ETH".to_string(),
                height: 1,
                tx_datetime: chrono::Utc::now(),
                publisher: "0xpublisher".to_string(),
                protocol: "aleph".to_string(),
                protocol_version: 1,
                content: Json(serde_json::json!({})),
            },
            txn,
        )
        .await
        .unwrap();
    }

    #[sqlx::test]
    async fn unconfirmed_message_is_not_confirmed(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let hash = ItemHash::new("m1");
        seed_message(&hash, &mut txn).await;
        assert!(!is_confirmed(&hash, &mut txn).await?);
        Ok(())
    }

    #[sqlx::test]
    async fn linking_a_tx_makes_the_message_confirmed(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let hash = ItemHash::new("m1");
        seed_message(&hash, &mut txn).await;
        seed_tx("tx1", &mut txn).await;

        add(&hash, "tx1", &mut txn).await?;
        assert!(is_confirmed(&hash, &mut txn).await?);
        Ok(())
    }
}
