use crate::error::HandlerResult;
use async_trait::async_trait;
use models::{ItemHash, Message};
use std::collections::HashSet;

/// One content type's handling logic (spec §4.4). A registry (see
/// `crate::registry`) dispatches each committed message to the handler for
/// its `MessageType`.
///
/// Default methods are no-ops so a handler only overrides what its content
/// type actually needs -- most types don't fetch extra blobs or gate on
/// balance, for instance.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Pulls any additional blobs this message references (a STORE's
    /// target file; a PROGRAM/INSTANCE's code/runtime/data/rootfs refs).
    /// Expected to be stateless with respect to the database -- only
    /// `process` and friends touch the transaction.
    async fn fetch_related_content(&self, _message: &Message) -> HandlerResult<()> {
        Ok(())
    }

    /// Verifies that messages this one depends on (amend targets, forget
    /// targets, volume refs, ...) exist and are in a compatible state.
    async fn check_dependencies(
        &self,
        _message: &Message,
        _txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        Ok(())
    }

    /// Verifies the sender is authorized to act as the content's address,
    /// either directly or via delegation (spec §4.4). Handlers with extra
    /// permission rules (FORGET) call this then layer their own checks on
    /// top.
    async fn check_permissions(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let authorized = crate::permission::check_permissions(
            &message.sender,
            message.content_address(),
            message.message_type,
            txn,
        )
        .await?;

        if !authorized {
            return Err(models::MessageProcessingError::PermissionDenied(format!(
                "{} is not authorized to act on behalf of {}",
                message.sender,
                message.content_address(),
            ))
            .into());
        }
        Ok(())
    }

    /// Only overridden by STORE, PROGRAM and INSTANCE: checks the sender's
    /// balance can cover this message's hold cost under the pricing
    /// schedule active at `message.time`.
    async fn check_balance(
        &self,
        _message: &Message,
        _txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        Ok(())
    }

    /// Applies this message's side effects within the commit coordinator's
    /// transaction (spec §4.10).
    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()>;

    /// Cleans up this message's type-specific state when it (or an
    /// original it amends) is forgotten. Returns any additional item
    /// hashes the caller should also mark FORGOTTEN (e.g. a post's
    /// amends).
    async fn forget_message(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<HashSet<ItemHash>>;
}
