use content::decode::decode_content;
use db::pending::PendingRow;
use models::{ItemType, Message, MessageProcessingError, RawMessage};
use std::sync::Arc;
use storage::ContentFetcher;

/// Resolves a pending row's content body (spec §4.3): parses it directly
/// when inline, otherwise asks the `ContentFetcher` to resolve `item_hash`
/// from the network. Either way the result is validated against the
/// content's own schema before the worker pool runs it through dependency
/// and permission checks.
pub async fn fetch(
    row: &PendingRow,
    fetcher: &Arc<ContentFetcher>,
) -> Result<Message, MessageProcessingError> {
    let raw = RawMessage {
        item_hash: row.item_hash.clone(),
        sender: row.sender.clone(),
        chain: row.chain.clone(),
        message_type: row.message_type,
        item_type: row.item_type,
        item_content: row.item_content.clone(),
        signature: row.signature.clone(),
        time: row.msg_time,
        channel: row.channel.clone(),
    };

    let bytes = match row.item_type {
        ItemType::Inline => {
            let Some(item_content) = &row.item_content else {
                return Err(MessageProcessingError::InvalidMessageFormat(
                    "inline item_type requires item_content".to_string(),
                ));
            };
            item_content.clone().into_bytes()
        }
        ItemType::Storage | ItemType::Ipfs => {
            let (bytes, _source) = fetcher
                .fetch(&row.item_hash, row.item_type)
                .await
                .map_err(|e| match e {
                    storage::StorageError::HashMismatch { hash } => {
                        MessageProcessingError::InvalidMessageFormat(format!(
                            "content fetched for {hash} does not match its claimed hash"
                        ))
                    }
                    _ => MessageProcessingError::ContentUnavailable(row.item_hash.clone()),
                })?;
            bytes.to_vec()
        }
    };

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| MessageProcessingError::InvalidMessageFormat(e.to_string()))?;
    let content = decode_content(row.message_type, value)?;

    Ok(Message::from_raw(raw, content, bytes.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use models::{Chain, MessageOrigin, MessageType};
    use uuid::Uuid;

    fn inline_row(item_content: &str) -> PendingRow {
        PendingRow {
            id: Uuid::new_v4(),
            item_hash: "h".into(),
            sender: "0xowner".to_string(),
            chain: Chain::Test,
            message_type: MessageType::Post,
            item_type: ItemType::Inline,
            item_content: Some(item_content.to_string()),
            signature: None,
            msg_time: 0.0,
            channel: None,
            retries: 0,
            next_attempt: Utc::now(),
            check_message: false,
            fetched: false,
            reception_time: Utc::now(),
            origin: MessageOrigin::Api,
            tx_hash: None,
        }
    }

    #[tokio::test]
    async fn inline_message_is_parsed_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(storage::FileSystemEngine::new(dir.path()).await.unwrap());
        let fetcher = Arc::new(ContentFetcher::new(local, None, None));

        let row = inline_row(r#"{"address":"0xowner","type":"test","content":{},"time":0.0}"#);
        let message = fetch(&row, &fetcher).await.unwrap();
        assert_eq!(message.content_address(), "0xowner");
    }

    #[tokio::test]
    async fn missing_inline_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(storage::FileSystemEngine::new(dir.path()).await.unwrap());
        let fetcher = Arc::new(ContentFetcher::new(local, None, None));

        let mut row = inline_row("{}");
        row.item_content = None;
        let err = fetch(&row, &fetcher).await.unwrap_err();
        assert!(matches!(err, MessageProcessingError::InvalidMessageFormat(_)));
    }
}
