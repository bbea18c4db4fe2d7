use chrono::{DateTime, Utc};
use db::chain_txs::ChainTxRow;
use models::{Chain, ItemHash, ItemType, MessageOrigin, MessageType, RawMessage};
use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Json;
use std::sync::Arc;
use storage::ContentFetcher;

/// A transaction observed on-chain, in one of the two event flavors spec
/// §4.12 names. `protocol`/`protocol_version` are stored verbatim for
/// observability; this node doesn't branch on them beyond picking an
/// event flavor.
pub struct ChainTx {
    pub hash: String,
    pub chain: Chain,
    pub height: i64,
    pub tx_datetime: DateTime<Utc>,
    pub publisher: String,
    pub protocol: String,
    pub protocol_version: i32,
    pub event: ChainEvent,
}

pub enum ChainEvent {
    /// The tx carries a content pointer to a JSON object holding an array
    /// of independently signed messages.
    OffchainBatch { pointer: ItemHash, item_type: ItemType },
    /// The tx carries the message's fields directly; the chain itself is
    /// the authenticator, so no signature travels with it.
    SmartContract {
        sender: String,
        message_type: MessageType,
        msgcontent: Value,
        time: f64,
        channel: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("failed to resolve batch pointer: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("malformed batch pointer content: {0}")]
    InvalidBatch(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct BatchPointer {
    messages: Vec<RawMessage>,
}

/// Ingests one observed transaction (spec §4.12). Re-ingestion of a known
/// `tx.hash` is a no-op -- `insert_if_new` is the single source of truth
/// for that dedup, so nothing downstream needs its own "have I seen this"
/// check.
pub async fn ingest(
    tx: &ChainTx,
    fetcher: &Arc<ContentFetcher>,
    pool: &sqlx::PgPool,
) -> Result<(), IngestError> {
    let content = event_content(&tx.event);

    let mut txn = pool.begin().await?;
    let is_new = db::chain_txs::insert_if_new(
        &ChainTxRow {
            hash: tx.hash.clone(),
            chain: tx.chain.as_str().to_string(),
            height: tx.height,
            tx_datetime: tx.tx_datetime,
            publisher: tx.publisher.clone(),
            protocol: tx.protocol.clone(),
            protocol_version: tx.protocol_version,
            content: Json(content),
        },
        &mut txn,
    )
    .await?;
    txn.commit().await?;

    if !is_new {
        return Ok(());
    }

    match &tx.event {
        ChainEvent::OffchainBatch { pointer, item_type } => {
            ingest_offchain_batch(tx, pointer, *item_type, fetcher, pool).await
        }
        ChainEvent::SmartContract {
            sender,
            message_type,
            msgcontent,
            time,
            channel,
        } => {
            ingest_smart_contract_event(tx, sender, *message_type, msgcontent, *time, channel, pool)
                .await
        }
    }
}

fn event_content(event: &ChainEvent) -> Value {
    match event {
        ChainEvent::OffchainBatch { pointer, item_type } => serde_json::json!({
            "address": pointer.as_str(),
            "item_type": item_type,
        }),
        ChainEvent::SmartContract {
            sender,
            message_type,
            msgcontent,
            time,
            channel,
        } => serde_json::json!({
            "sender": sender,
            "type": message_type,
            "content": msgcontent,
            "time": time,
            "channel": channel,
        }),
    }
}

async fn ingest_offchain_batch(
    tx: &ChainTx,
    pointer: &ItemHash,
    item_type: ItemType,
    fetcher: &Arc<ContentFetcher>,
    pool: &sqlx::PgPool,
) -> Result<(), IngestError> {
    let (bytes, _source) = fetcher.fetch(pointer, item_type).await?;
    let batch: BatchPointer = serde_json::from_slice(&bytes)?;

    let mut txn = pool.begin().await?;
    for raw in batch.messages {
        db::pending::enqueue(
            db::pending::NewPending {
                item_hash: &raw.item_hash,
                sender: &raw.sender,
                chain: raw.chain.clone(),
                message_type: raw.message_type,
                item_type: raw.item_type,
                item_content: raw.item_content.as_deref(),
                signature: raw.signature.as_deref(),
                msg_time: raw.time,
                channel: raw.channel.as_deref(),
                check_message: true,
                origin: MessageOrigin::OnChain,
                tx_hash: Some(&tx.hash),
            },
            &mut txn,
        )
        .await?;
    }
    txn.commit().await?;
    Ok(())
}

async fn ingest_smart_contract_event(
    tx: &ChainTx,
    sender: &str,
    message_type: MessageType,
    msgcontent: &Value,
    time: f64,
    channel: &Option<String>,
    pool: &sqlx::PgPool,
) -> Result<(), IngestError> {
    let item_content =
        serde_json::to_string(msgcontent).expect("serde_json::Value always serializes");
    let item_hash = ItemHash::sha256(item_content.as_bytes());

    let mut txn = pool.begin().await?;
    db::pending::enqueue(
        db::pending::NewPending {
            item_hash: &item_hash,
            sender,
            chain: tx.chain.clone(),
            message_type,
            item_type: ItemType::Inline,
            item_content: Some(&item_content),
            signature: None,
            msg_time: time,
            channel: channel.as_deref(),
            check_message: false,
            origin: MessageOrigin::OnChain,
            tx_hash: Some(&tx.hash),
        },
        &mut txn,
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offchain_event_serializes_its_pointer() {
        let event = ChainEvent::OffchainBatch {
            pointer: "abc".into(),
            item_type: ItemType::Storage,
        };
        let value = event_content(&event);
        assert_eq!(value["address"], "abc");
    }
}
