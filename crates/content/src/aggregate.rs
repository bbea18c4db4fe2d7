use crate::error::HandlerResult;
use crate::handler::ContentHandler;
use async_trait::async_trait;
use db::aggregates::{self, ElementRow};
use models::content::Content;
use models::{timestamp_to_datetime, ItemHash, Message};
use serde_json::Value;
use std::collections::HashSet;

/// Default number of elements an aggregate can hold before an out-of-order
/// arrival that can't be cheaply reconciled gives up and marks it dirty
/// instead of paying for a full recompute (spec §4.5). Overridable per
/// deployment via `--dirty-threshold`.
pub const DEFAULT_DIRTY_THRESHOLD: i64 = 1000;

/// AGGREGATE handler: folds one element onto `(owner, key)`'s materialized
/// content via whichever of the three update paths applies (spec §4.5).
pub struct AggregateHandler {
    dirty_threshold: i64,
}

impl AggregateHandler {
    pub fn new(dirty_threshold: i64) -> Self {
        Self { dirty_threshold }
    }
}

impl Default for AggregateHandler {
    fn default() -> Self {
        Self::new(DEFAULT_DIRTY_THRESHOLD)
    }
}

#[async_trait]
impl ContentHandler for AggregateHandler {
    async fn process(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<()> {
        let Content::Aggregate(content) = &message.content else {
            unreachable!("registry only dispatches AGGREGATE messages here");
        };

        let owner = &content.address;
        let key = &content.key;
        let element_time = timestamp_to_datetime(content.time);
        let element_content = Value::Object(content.content.clone());

        aggregates::insert_element(
            &ElementRow {
                item_hash: message.item_hash.clone(),
                owner: owner.clone(),
                key: key.clone(),
                creation_datetime: element_time,
                content: sqlx::types::Json(element_content.clone()),
            },
            txn,
        )
        .await?;

        let Some(aggregate) = aggregates::get(owner, key, txn).await? else {
            aggregates::create(
                owner,
                key,
                &element_content,
                element_time,
                &message.item_hash,
                txn,
            )
            .await?;
            return Ok(());
        };

        if aggregate.dirty {
            tracing::debug!(%owner, %key, "aggregate is dirty, skipping update");
            return Ok(());
        }

        // Fast path: the new element is posterior to everything folded so
        // far. Overlay it on top of the current content.
        if element_time > aggregate.last_revision_creation_datetime {
            let merged = models::content::aggregate::merge(
                as_object(&aggregate.content.0),
                &content.content,
            );
            aggregates::update(
                owner,
                key,
                &Value::Object(merged),
                aggregate.creation_datetime,
                &message.item_hash,
                element_time,
                txn,
            )
            .await?;
            return Ok(());
        }

        // Similarly fast: the new element predates everything folded so
        // far. Overlay the current content on top of it (current wins on
        // key conflicts, since it's still the more recent write).
        if element_time < aggregate.creation_datetime {
            let merged = models::content::aggregate::merge(
                &content.content,
                as_object(&aggregate.content.0),
            );
            aggregates::update(
                owner,
                key,
                &Value::Object(merged),
                element_time,
                &aggregate.last_revision_hash,
                aggregate.last_revision_creation_datetime,
                txn,
            )
            .await?;
            return Ok(());
        }

        // Out-of-order: the element lands strictly between the earliest
        // and latest known revisions. Only a full recompute can place it
        // correctly, so fall back to that unless the aggregate has grown
        // too large to justify the cost.
        if aggregates::count_elements(owner, key, txn).await? > self.dirty_threshold {
            tracing::info!(%owner, %key, "too many elements for out-of-order recompute, marking dirty");
            aggregates::mark_dirty(owner, key, txn).await?;
            return Ok(());
        }

        recompute(owner, key, txn).await
    }

    async fn forget_message(
        &self,
        message: &Message,
        txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> HandlerResult<HashSet<ItemHash>> {
        let Content::Aggregate(content) = &message.content else {
            unreachable!("registry only dispatches AGGREGATE messages here");
        };

        aggregates::delete(&content.address, &content.key, txn).await?;
        aggregates::delete_element(&message.item_hash, txn).await?;
        recompute(&content.address, &content.key, txn).await?;

        Ok(HashSet::new())
    }
}

/// Refolds every element for `(owner, key)` from scratch, oldest first,
/// and persists the result (no-op if the aggregate has since lost all its
/// elements, e.g. after a forget).
async fn recompute(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> HandlerResult<()> {
    let elements = aggregates::elements_for(owner, key, txn).await?;
    let Some(first) = elements.first() else {
        return Ok(());
    };
    let last = elements.last().unwrap();

    let folded = models::content::aggregate::fold(elements.iter().map(|e| as_object(&e.content.0)));

    aggregates::create(
        owner,
        key,
        &Value::Object(folded.clone()),
        first.creation_datetime,
        &first.item_hash,
        txn,
    )
    .await?;
    aggregates::update(
        owner,
        key,
        &Value::Object(folded),
        first.creation_datetime,
        &last.item_hash,
        last.creation_datetime,
        txn,
    )
    .await?;
    Ok(())
}

fn as_object(value: &Value) -> &serde_json::Map<String, Value> {
    value.as_object().expect("aggregate content is always a JSON object")
}
