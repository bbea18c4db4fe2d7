use crate::error::HandlerResult;
use crate::handler::ContentHandler;
use async_trait::async_trait;
use chrono::Duration;
use costs::PricingSchedule;
use models::content::Content;
use models::{ItemHash, Message, MessageProcessingError};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use storage::ContentFetcher;

/// Unauthenticated direct uploads would be capped tighter than
/// authenticated STORE messages (spec §4.7); kept as a named policy
/// constant even though this node has no upload endpoint of its own to
/// enforce it at (see DESIGN.md).
pub const MAX_UNAUTHENTICATED_UPLOAD: i64 = 25 * 1024 * 1024;
/// Default cap for an authenticated STORE's fetched content, overridable
/// per deployment via `--max-file-size`.
pub const DEFAULT_MAX_FILE_SIZE: i64 = 100 * 1024 * 1024;

/// Hours a file with no remaining pin stays around before the garbage
/// collector is allowed to delete it (spec §4.7).
const GRACE_PERIOD_HOURS: i64 = 25;

/// STORE handler: pins a content-addressed file to the message that
/// references it (spec §4.7). Fetching happens ahead of the commit
/// transaction via `fetch_related_content`, since the fetcher talks to the
/// network and the database transaction must stay short.
pub struct StoreHandler {
    fetcher: Arc<ContentFetcher>,
    max_file_size: i64,
    schedule: PricingSchedule,
}

impl StoreHandler {
    pub fn new(fetcher: Arc<ContentFetcher>, max_file_size: i64, schedule: PricingSchedule) -> Self {
        Self { fetcher, max_file_size, schedule }
    }
}

/// Adapts a single pre-fetched balance total to `costs::BalanceSource`,
/// same trick `VmHandler` uses -- the gate only ever asks about the one
/// address a message is billed to.
struct SingleBalance(Decimal);

impl costs::BalanceSource for SingleBalance {
    fn balance_of(&self, _address: &str) -> Decimal {
        self.0
    }
}

#[async_trait]
impl ContentHandler for StoreHandler {
    async fn fetch_related_content(&self, message: &Message) -> HandlerResult<()> {
        let Content::Store(content) = &message.content else {
            unreachable!("registry only dispatches STORE messages here");
        };

        let (bytes, _source) = self
            .fetcher
            .fetch(&content.item_hash, content.item_type)
            .await
            .map_err(|e| match e {
                storage::StorageError::HashMismatch { hash } => {
                    MessageProcessingError::InvalidMessageFormat(format!(
                        "fetched content for {hash} does not match its claimed hash"
                    ))
                }
                _ => MessageProcessingError::FileUnavailable(content.item_hash.clone()),
            })?;

        let max = content.size.unwrap_or(self.max_file_size).min(self.max_file_size);
        if bytes.len() as i64 > max {
            return Err(MessageProcessingError::InvalidMessageFormat(format!(
                "file {} is {} bytes, exceeding the {} byte limit",
                content.item_hash,
                bytes.len(),
                max,
            ))
            .into());
        }

        Ok(())
    }

    async fn check_dependencies(
        &self,
        message: &Message,
        _txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Store(content) = &message.content else {
            unreachable!("registry only dispatches STORE messages here");
        };
        // Update trees (an amend of an amend) aren't supported for STORE,
        // so any `ref` at all is rejected rather than validated further.
        if content.reference.is_some() {
            return Err(MessageProcessingError::StoreCannotUpdateStoreWithRef.into());
        }
        Ok(())
    }

    async fn check_balance(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Store(content) = &message.content else {
            unreachable!("registry only dispatches STORE messages here");
        };
        let required = hold_cost(content.size, &self.schedule);

        let balance = db::balances::get_in_txn(&content.address, txn).await?;
        let held = db::costs::total_held(&content.address, txn).await?;
        costs::check_balance(&SingleBalance(balance), &content.address, required + held)?;
        Ok(())
    }

    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Store(content) = &message.content else {
            unreachable!("registry only dispatches STORE messages here");
        };

        let size = content.size.unwrap_or(0);
        let file_type = match content.item_type {
            models::ItemType::Inline => "inline",
            models::ItemType::Storage => "storage",
            models::ItemType::Ipfs => "ipfs",
        };
        db::files::upsert_stored_file(&content.item_hash, size, file_type, txn).await?;
        db::files::add_message_pin(&content.item_hash, &message.item_hash, txn).await?;

        db::costs::insert(
            &db::costs::AccountCostRow {
                item_hash: message.item_hash.clone(),
                owner: content.address.clone(),
                cost_hold: hold_cost(content.size, &self.schedule),
                cost_stream: Decimal::ZERO,
            },
            txn,
        )
        .await?;

        Ok(())
    }

    async fn forget_message(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<HashSet<ItemHash>> {
        let Content::Store(content) = &message.content else {
            unreachable!("registry only dispatches STORE messages here");
        };

        db::files::remove_message_pin(&content.item_hash, &message.item_hash, txn).await?;
        db::files::add_grace_period_pin(
            &content.item_hash,
            chrono::Utc::now() + Duration::hours(GRACE_PERIOD_HOURS),
            txn,
        )
        .await?;
        db::costs::remove(&message.item_hash, txn).await?;

        Ok(HashSet::new())
    }
}

/// Holding cost for a STORE's declared size, floored at the storage
/// product's minimum billable size (spec §4.7, §3.8).
fn hold_cost(declared_size: Option<i64>, schedule: &PricingSchedule) -> Decimal {
    let size_bytes = declared_size.unwrap_or(0).max(0) as u64;
    costs::compute_store_hold_cost(size_bytes, schedule)
}
