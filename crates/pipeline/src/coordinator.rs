use content::{ContentHandler, ContentRegistry};
use db::messages::MessageRow;
use models::{Message, MessageProcessingError, MessageStatus};
use sqlx::types::Json;
use uuid::Uuid;

/// What drove this commit, so step 4/5 of the commit coordinator (spec
/// §4.10) know whether to delete a pending row or record a confirmation.
/// `Pending`'s second field carries the chain tx that queued it, if any --
/// a message can be confirmed by the same event that first reported it
/// (spec §4.12's on-chain ingestion path), in which case the confirmation
/// is recorded alongside clearing the pending row rather than instead of
/// it.
pub enum Trigger<'a> {
    Pending(Uuid, Option<&'a str>),
    Confirmation(&'a str),
}

/// Runs the full per-message commit (spec §4.10) in one transaction:
/// dependency/permission/balance checks, insert the immutable message row,
/// run the type handler's `process`, mark the message PROCESSED, then
/// clear whatever queued it. Any error rolls the whole transaction back --
/// the caller decides whether to reschedule or reject based on what comes
/// back. `fetch_related_content` is the one handler step that runs outside
/// this transaction (see `worker::process_one`): it talks to the network,
/// and the database transaction must stay short.
pub async fn commit(
    message: &Message,
    registry: &ContentRegistry,
    trigger: Trigger<'_>,
    pool: &sqlx::PgPool,
) -> Result<(), CommitError> {
    let mut txn = pool.begin().await?;
    let handler = registry.get(message.message_type);

    handler
        .check_dependencies(message, &mut txn)
        .await
        .map_err(CommitError::from_handler)?;
    handler
        .check_permissions(message, &mut txn)
        .await
        .map_err(CommitError::from_handler)?;
    if message.message_type.is_resource_bearing() {
        handler
            .check_balance(message, &mut txn)
            .await
            .map_err(CommitError::from_handler)?;
    }

    let content_json = serde_json::to_value(content_for_storage(message))
        .map_err(|e| CommitError::Processing(MessageProcessingError::Internal(e.to_string())))?;

    db::messages::insert(
        &MessageRow {
            item_hash: message.item_hash.clone(),
            sender: message.sender.clone(),
            chain: message.chain.clone(),
            message_type: message.message_type,
            item_type: message.item_type,
            item_content: message.item_content.clone(),
            signature: message.signature.clone(),
            time: message.time,
            channel: message.channel.clone(),
            content: Json(content_json),
            size: message.size,
        },
        &mut txn,
    )
    .await?;

    handler
        .process(message, &mut txn)
        .await
        .map_err(CommitError::from_handler)?;

    db::messages::upsert_status(&message.item_hash, MessageStatus::Processed, None, None, &mut txn)
        .await?;

    match trigger {
        Trigger::Pending(id, tx_hash) => {
            db::pending::remove(id, &mut txn).await?;
            if let Some(tx_hash) = tx_hash {
                db::confirmations::add(&message.item_hash, tx_hash, &mut txn).await?;
            }
        }
        Trigger::Confirmation(tx_hash) => {
            db::confirmations::add(&message.item_hash, tx_hash, &mut txn).await?
        }
    }

    txn.commit().await?;
    Ok(())
}

/// Re-serializes the already-typed content back to the shape it was
/// originally published in, so the stored `messages.content` column is the
/// same JSON a client would have sent, not an internal Rust projection.
fn content_for_storage(message: &Message) -> serde_json::Value {
    use models::content::Content;
    let value = match &message.content {
        Content::Aggregate(c) => serde_json::to_value(c),
        Content::Post(c) => serde_json::to_value(c),
        Content::Store(c) => serde_json::to_value(c),
        Content::Program(c) => serde_json::to_value(c),
        Content::Instance(c) => serde_json::to_value(c),
        Content::Forget(c) => serde_json::to_value(c),
    };
    value.unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    Processing(MessageProcessingError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl CommitError {
    fn from_handler(err: content::HandlerError) -> Self {
        match err {
            content::HandlerError::Processing(e) => CommitError::Processing(e),
            content::HandlerError::Db(e) => CommitError::Db(e),
        }
    }

    pub fn into_processing(self) -> MessageProcessingError {
        match self {
            CommitError::Processing(e) => e,
            CommitError::Db(e) => MessageProcessingError::Internal(e.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::Processing(e) => e.is_retryable(),
            CommitError::Db(_) => true,
        }
    }
}
