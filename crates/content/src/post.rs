use crate::error::HandlerResult;
use crate::handler::ContentHandler;
use async_trait::async_trait;
use db::balances::BalanceRow;
use models::content::post::BalancesPostContent;
use models::content::Content;
use models::{timestamp_to_datetime, ItemHash, Message, MessageProcessingError};
use std::collections::HashSet;

/// POST handler: stores original posts and amends (spec §3.6, §4.6), and
/// doubles as the balance oracle ingestion path when a post's `type` and
/// `address` match the configured oracle (spec §4.13).
pub struct PostHandler {
    /// `post_type` that marks a post as a balance snapshot.
    pub balances_post_type: String,
    /// Addresses trusted to publish balance snapshots under that type.
    pub balances_addresses: Vec<String>,
}

#[async_trait]
impl ContentHandler for PostHandler {
    async fn check_dependencies(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Post(content) = &message.content else {
            unreachable!("registry only dispatches POST messages here");
        };

        if content.is_amend() {
            let target_hash = content
                .reference
                .as_ref()
                .ok_or(MessageProcessingError::NoAmendTarget)?;
            let original = db::posts::get(target_hash, txn)
                .await?
                .ok_or_else(|| MessageProcessingError::AmendTargetNotFound(target_hash.clone()))?;
            if original.reference.is_some() {
                return Err(MessageProcessingError::CannotAmendAmend.into());
            }
        }
        Ok(())
    }

    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Post(content) = &message.content else {
            unreachable!("registry only dispatches POST messages here");
        };
        let creation_time = timestamp_to_datetime(content.time);

        db::posts::insert(
            &message.item_hash,
            &content.address,
            &content.post_type,
            content.reference.as_ref(),
            &content.content,
            creation_time,
            txn,
        )
        .await?;

        if content.is_amend() {
            if let Some(original) = &content.reference {
                db::posts::advance_latest_amend(original, &message.item_hash, creation_time, txn)
                    .await?;
            }
        }

        let is_balance_oracle = content.post_type == self.balances_post_type
            && self
                .balances_addresses
                .iter()
                .any(|a| a == &content.address);
        if is_balance_oracle {
            let snapshot: BalancesPostContent = serde_json::from_value(content.content.clone())
                .map_err(|e| MessageProcessingError::InvalidMessageFormat(e.to_string()))?;
            let dapp = snapshot.dapp.clone().unwrap_or_default();
            for (address, balance) in snapshot.balances {
                db::balances::upsert(
                    &BalanceRow {
                        address,
                        chain: snapshot.chain.clone(),
                        dapp: dapp.clone(),
                        balance,
                        eth_height: snapshot.main_height,
                    },
                    txn,
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn forget_message(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<HashSet<ItemHash>> {
        let Content::Post(content) = &message.content else {
            unreachable!("registry only dispatches POST messages here");
        };

        let amend_hashes = db::posts::amends_of(&message.item_hash, txn).await?;
        for hash in &amend_hashes {
            db::posts::delete(hash, txn).await?;
        }
        db::posts::delete(&message.item_hash, txn).await?;

        if let Some(original) = &content.reference {
            db::posts::recompute_latest_amend(original, txn).await?;
        }

        Ok(amend_hashes.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_oracle_matches_type_and_address() {
        let handler = PostHandler {
            balances_post_type: "balances".to_string(),
            balances_addresses: vec!["0xoracle".to_string()],
        };
        assert!(handler.balances_addresses.contains(&"0xoracle".to_string()));
        assert_eq!(handler.balances_post_type, "balances");
    }
}
