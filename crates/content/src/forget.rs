use crate::decode::decode_content;
use crate::error::HandlerResult;
use crate::handler::ContentHandler;
use async_trait::async_trait;
use models::content::{Content, ForgetContent};
use models::{ItemHash, Message, MessageProcessingError, MessageStatus, MessageType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// FORGET handler (spec §4.9): marks other messages -- and whatever their
/// own `forget_message` returns as secondary targets -- FORGOTTEN. Holds
/// the other five handlers so a forget can invoke each target's own
/// type-specific cleanup before the target itself is marked.
pub struct ForgetHandler {
    handlers: HashMap<MessageType, Arc<dyn ContentHandler>>,
}

impl ForgetHandler {
    pub fn new(handlers: HashMap<MessageType, Arc<dyn ContentHandler>>) -> Self {
        Self { handlers }
    }

    /// Explicit `hashes` plus every element hash backing each listed
    /// `aggregates` key under the forget message's own address.
    async fn expand_targets(
        &self,
        content: &ForgetContent,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<Vec<ItemHash>> {
        let mut targets = content.hashes.clone();
        for key in &content.aggregates {
            if !db::aggregates::exists(&content.address, key, txn).await? {
                return Err(MessageProcessingError::ForgetTargetNotFound {
                    target_hash: None,
                    aggregate_key: Some(key.clone()),
                }
                .into());
            }
            let elements = db::aggregates::elements_for(&content.address, key, txn).await?;
            targets.extend(elements.into_iter().map(|e| e.item_hash));
        }
        Ok(targets)
    }

    async fn forget_target(
        &self,
        target_hash: &ItemHash,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        if let Some(status) = db::messages::get_status_in_txn(target_hash, txn).await? {
            if status.status == MessageStatus::Forgotten {
                return Ok(());
            }
        }
        let Some(row) = db::messages::get_in_txn(target_hash, txn).await? else {
            return Ok(());
        };

        let content = decode_content(row.message_type, row.content.0.clone())?;
        let target_message = Message {
            item_hash: row.item_hash.clone(),
            sender: row.sender.clone(),
            chain: row.chain.clone(),
            message_type: row.message_type,
            item_type: row.item_type,
            item_content: row.item_content.clone(),
            signature: row.signature.clone(),
            time: row.time,
            channel: row.channel.clone(),
            content,
            size: row.size,
        };

        let handler = self
            .handlers
            .get(&row.message_type)
            .expect("every non-FORGET message type has a registered handler");
        let secondary = handler.forget_message(&target_message, txn).await?;

        // STORE doesn't go straight to FORGOTTEN: its blob may still be
        // live under another pin, so it sits in REMOVING until the garbage
        // collector confirms every pin is gone (spec §4.7).
        let terminal_status = match row.message_type {
            MessageType::Store => MessageStatus::Removing,
            _ => MessageStatus::Forgotten,
        };
        set_status(target_hash, terminal_status, txn).await?;
        for secondary_hash in secondary {
            set_status(&secondary_hash, MessageStatus::Forgotten, txn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentHandler for ForgetHandler {
    async fn check_dependencies(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Forget(content) = &message.content else {
            unreachable!("registry only dispatches FORGET messages here");
        };
        if content.is_empty() {
            return Err(MessageProcessingError::NoForgetTarget.into());
        }
        self.expand_targets(content, txn).await?;

        // Only explicit targets matter here, not aggregate-expanded ones --
        // a STORE'd file is the only thing a VM volume can reference.
        for target_hash in &content.hashes {
            let Some(target) = db::messages::get_in_txn(target_hash, txn).await? else {
                continue;
            };
            if target.message_type != MessageType::Store {
                continue;
            }
            let Content::Store(store_content) = decode_content(target.message_type, target.content.0)?
            else {
                continue;
            };
            if let Some(vm_hash) =
                db::vms::dependent_vm(&store_content.item_hash, txn).await?
            {
                return Err(MessageProcessingError::ForgetNotAllowed {
                    file_hash: store_content.item_hash,
                    vm_hash,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn check_permissions(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Forget(content) = &message.content else {
            unreachable!("registry only dispatches FORGET messages here");
        };
        let targets = self.expand_targets(content, txn).await?;

        for target_hash in &targets {
            let status = db::messages::get_status_in_txn(target_hash, txn).await?;
            let status = match status {
                Some(s) => s,
                None => {
                    return Err(MessageProcessingError::ForgetTargetNotFound {
                        target_hash: Some(target_hash.clone()),
                        aggregate_key: None,
                    }
                    .into())
                }
            };
            // Already gone: nothing left to authorize against, and the
            // forget is a harmless idempotent no-op for this target.
            if matches!(
                status.status,
                MessageStatus::Forgotten | MessageStatus::Rejected | MessageStatus::Removed
            ) {
                continue;
            }
            if !matches!(status.status, MessageStatus::Processed | MessageStatus::Removing) {
                return Err(MessageProcessingError::ForgetTargetNotFound {
                    target_hash: Some(target_hash.clone()),
                    aggregate_key: None,
                }
                .into());
            }

            let target = db::messages::get_in_txn(target_hash, txn)
                .await?
                .ok_or_else(|| MessageProcessingError::ForgetTargetNotFound {
                    target_hash: Some(target_hash.clone()),
                    aggregate_key: None,
                })?;
            if target.message_type == MessageType::Forget {
                return Err(MessageProcessingError::CannotForgetForgetMessage(target_hash.clone()).into());
            }

            let authorized = crate::permission::check_permissions(
                &message.sender,
                &target.sender,
                target.message_type,
                txn,
            )
            .await?;
            if !authorized {
                return Err(MessageProcessingError::PermissionDenied(format!(
                    "{} is not authorized to forget {target_hash} (owned by {})",
                    message.sender, target.sender,
                ))
                .into());
            }
        }
        Ok(())
    }

    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Forget(content) = &message.content else {
            unreachable!("registry only dispatches FORGET messages here");
        };
        let targets = self.expand_targets(content, txn).await?;
        for target_hash in &targets {
            self.forget_target(target_hash, txn).await?;
        }
        Ok(())
    }

    async fn forget_message(
        &self,
        message: &Message,
        _txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<HashSet<ItemHash>> {
        Err(MessageProcessingError::CannotForgetForgetMessage(message.item_hash.clone()).into())
    }
}

async fn set_status(
    item_hash: &ItemHash,
    status: MessageStatus,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> HandlerResult<()> {
    db::messages::upsert_status(item_hash, status, None, None, txn).await?;
    Ok(())
}
