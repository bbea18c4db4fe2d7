use crate::error::HandlerResult;
use crate::handler::ContentHandler;
use async_trait::async_trait;
use costs::{compute_hold_cost, FileSizeResolver, PricingSchedule};
use db::vms::VmRow;
use models::content::{Content, ExecutableContent, InstanceContent};
use models::{timestamp_to_datetime, ItemHash, Message, MessageProcessingError};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Shared PROGRAM/INSTANCE handler (spec §4.8): both content types go
/// through the same volume validation, amend-chain rules and cost gate via
/// the `ExecutableContent` trait, and differ only in how their row gets
/// stored and what `is_persistent()`/`extra_sized_bytes()` report.
pub struct VmHandler {
    schedule: PricingSchedule,
}

impl VmHandler {
    pub fn new(schedule: PricingSchedule) -> Self {
        Self { schedule }
    }

    /// One-time hold cost for `content` under the active schedule, sizing
    /// immutable refs from whatever's already in `stored_files`. Shared by
    /// `check_balance` (checked against balance + already-held costs) and
    /// `process` (recorded as this message's own `AccountCostRow`).
    async fn required_cost(
        &self,
        content: &dyn ExecutableContent,
        is_instance: bool,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<Decimal> {
        let mut sizes = HashMap::new();
        for reference in content.immutable_refs() {
            if let Some(row) = db::files::get_stored_file(reference, txn).await? {
                sizes.insert(reference.clone(), row.size as u64);
            }
        }
        let resolver = MapResolver(sizes);

        compute_hold_cost(content, is_instance, &resolver, &self.schedule)
            .map_err(|costs::CostError::UnresolvedVolume(hash)| {
                MessageProcessingError::VmVolumeNotFound(vec![hash]).into()
            })
    }
}

struct MapResolver(HashMap<ItemHash, u64>);

impl FileSizeResolver for MapResolver {
    fn size_of(&self, reference: &ItemHash) -> Option<u64> {
        self.0.get(reference).copied()
    }
}

struct SingleBalance(Decimal);

impl costs::BalanceSource for SingleBalance {
    fn balance_of(&self, _address: &str) -> Decimal {
        self.0
    }
}

fn executable(message: &Message) -> &dyn ExecutableContent {
    message
        .content
        .as_executable()
        .expect("registry only dispatches PROGRAM/INSTANCE messages here")
}

#[async_trait]
impl ContentHandler for VmHandler {
    async fn check_dependencies(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let content = executable(message);

        let mut missing = Vec::new();
        for reference in content.immutable_refs() {
            if db::files::get_stored_file(reference, txn).await?.is_none() {
                missing.push(reference.clone());
            }
        }
        if !missing.is_empty() {
            return Err(MessageProcessingError::VmVolumeNotFound(missing).into());
        }

        if let Some(target_hash) = content.replaces() {
            let target = db::vms::get(target_hash, txn)
                .await?
                .ok_or_else(|| MessageProcessingError::VmRefNotFound(target_hash.clone()))?;
            if !target.allow_amend {
                return Err(MessageProcessingError::VmUpdateNotAllowed.into());
            }
            if target.replaces.is_some() {
                return Err(MessageProcessingError::VmCannotUpdateUpdate.into());
            }
            check_rootfs_not_shrunk(message, &target, target_hash)?;
        }

        Ok(())
    }

    async fn check_balance(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let content = executable(message);
        let is_instance = matches!(message.content, Content::Instance(_));
        let required = self.required_cost(content, is_instance, txn).await?;

        let owner = content.address();
        let balance = db::balances::get_in_txn(owner, txn).await?;
        let held = db::costs::total_held(owner, txn).await?;
        costs::check_balance(&SingleBalance(balance), owner, required + held)?;
        Ok(())
    }

    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let (content_json, is_instance) = match &message.content {
            Content::Program(c) => (
                serde_json::to_value(c)
                    .map_err(|e| MessageProcessingError::Internal(e.to_string()))?,
                false,
            ),
            Content::Instance(c) => (
                serde_json::to_value(c)
                    .map_err(|e| MessageProcessingError::Internal(e.to_string()))?,
                true,
            ),
            _ => unreachable!("registry only dispatches PROGRAM/INSTANCE messages here"),
        };
        let content = executable(message);
        let creation_time = timestamp_to_datetime(content.time());

        db::vms::insert(
            &VmRow {
                item_hash: message.item_hash.clone(),
                owner: content.address().to_string(),
                is_instance,
                content: sqlx::types::Json(content_json),
                creation_datetime: creation_time,
                allow_amend: content.allow_amend(),
                replaces: content.replaces().cloned(),
            },
            txn,
        )
        .await?;

        let original_hash = content.replaces().unwrap_or(&message.item_hash);
        db::vms::recompute_head(original_hash, txn).await?;

        let refs: Vec<ItemHash> = content.immutable_refs().into_iter().cloned().collect();
        db::vms::set_volumes(&message.item_hash, &refs, txn).await?;

        let cost_hold = self.required_cost(content, is_instance, txn).await?;
        db::costs::insert(
            &db::costs::AccountCostRow {
                item_hash: message.item_hash.clone(),
                owner: content.address().to_string(),
                cost_hold,
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
        let content = executable(message);

        db::vms::delete(&message.item_hash, txn).await?;
        db::costs::remove(&message.item_hash, txn).await?;

        if let Some(original) = content.replaces() {
            db::vms::recompute_head(original, txn).await?;
            return Ok(HashSet::new());
        }

        // Forgetting the original cascades to every remaining amend (spec
        // §4.8's amend chain has no independent life once its original is
        // gone).
        let amends = db::vms::amends_of(&message.item_hash, txn).await?;
        for amend in &amends {
            db::vms::delete(amend, txn).await?;
            db::costs::remove(amend, txn).await?;
        }
        Ok(amends.into_iter().collect())
    }
}

/// Instances only: an amend can't shrink the rootfs below what the target
/// already allocated, since existing persistent data living on the parent
/// disk wouldn't fit.
fn check_rootfs_not_shrunk(
    message: &Message,
    target: &VmRow,
    target_hash: &ItemHash,
) -> HandlerResult<()> {
    let Content::Instance(current) = &message.content else {
        return Ok(());
    };
    let previous: InstanceContent = serde_json::from_value(target.content.0.clone())
        .map_err(|e| MessageProcessingError::Internal(e.to_string()))?;

    if current.rootfs.size_mib < previous.rootfs.size_mib {
        return Err(MessageProcessingError::VmVolumeTooSmall {
            volume_name: "rootfs".to_string(),
            volume_size: current.rootfs.size_mib * 1024 * 1024,
            parent_ref: target_hash.clone(),
            parent_file: previous.rootfs.parent.reference.clone(),
            parent_size: previous.rootfs.size_mib * 1024 * 1024,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_balance_reports_same_value_for_any_address() {
        let source = SingleBalance(Decimal::from(42));
        assert_eq!(costs::BalanceSource::balance_of(&source, "anyone"), Decimal::from(42));
    }
}
