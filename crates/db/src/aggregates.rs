use chrono::{DateTime, Utc};
use models::ItemHash;
use serde_json::Value;
use sqlx::types::Json;

/// One contribution to an aggregate (spec §3.6). Ordered by
/// `creation_datetime` when folded into the materialized aggregate.
#[derive(Debug)]
pub struct ElementRow {
    pub item_hash: ItemHash,
    pub owner: String,
    pub key: String,
    pub creation_datetime: DateTime<Utc>,
    pub content: Json<Value>,
}

pub async fn insert_element(
    element: &ElementRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into aggregate_elements (item_hash, owner, key, creation_datetime, content)
        values ($1, $2, $3, $4, $5)
        on conflict (item_hash) do nothing
        "#,
        element.item_hash.as_str(),
        element.owner,
        element.key,
        element.creation_datetime,
        element.content as _,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// All elements for `(owner, key)`, oldest first -- the fold order
/// required to reproduce the aggregate's current content from scratch.
pub async fn elements_for(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Vec<ElementRow>> {
    sqlx::query_as!(
        ElementRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            owner,
            key,
            creation_datetime,
            content as "content: Json<Value>"
        from aggregate_elements
        where owner = $1 and key = $2
        order by creation_datetime asc
        "#,
        owner,
        key,
    )
    .fetch_all(&mut **txn)
    .await
}

pub async fn count_elements(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<i64> {
    let count: Option<i64> = sqlx::query_scalar!(
        r#"select count(*) as "count" from aggregate_elements where owner = $1 and key = $2"#,
        owner,
        key,
    )
    .fetch_one(&mut **txn)
    .await?;
    Ok(count.unwrap_or(0))
}

pub async fn exists(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<bool> {
    let found: Option<i32> = sqlx::query_scalar!(
        r#"select 1 as "found!" from aggregates where owner = $1 and key = $2"#,
        owner,
        key,
    )
    .fetch_optional(&mut **txn)
    .await?;
    Ok(found.is_some())
}

/// The materialized aggregate row: the folded content plus bookkeeping.
///
/// `creation_datetime` is the creation time of the *earliest* known
/// element and only ever moves earlier (a prepend). `last_revision_hash`
/// / `last_revision_creation_datetime` track the most recently folded-in
/// element and only ever move later (an append). `dirty` is set when an
/// out-of-order element can't be cheaply reconciled and cleared once a
/// full recompute runs (spec §4.5, §9's out-of-order handling).
#[derive(Debug)]
pub struct AggregateRow {
    pub owner: String,
    pub key: String,
    pub content: Json<Value>,
    pub creation_datetime: DateTime<Utc>,
    pub last_revision_hash: ItemHash,
    pub last_revision_creation_datetime: DateTime<Utc>,
    pub dirty: bool,
}

pub async fn get(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<AggregateRow>> {
    sqlx::query_as!(
        AggregateRow,
        r#"select
            owner,
            key,
            content as "content: Json<Value>",
            creation_datetime,
            last_revision_hash as "last_revision_hash: ItemHash",
            last_revision_creation_datetime,
            dirty
        from aggregates
        where owner = $1 and key = $2
        "#,
        owner,
        key,
    )
    .fetch_optional(&mut **txn)
    .await
}

/// Creates the materialized row from the very first element seen for
/// `(owner, key)`.
pub async fn create(
    owner: &str,
    key: &str,
    content: &Value,
    creation_datetime: DateTime<Utc>,
    revision_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into aggregates
            (owner, key, content, creation_datetime, last_revision_hash, last_revision_creation_datetime, dirty)
        values ($1, $2, $3, $4, $5, $4, false)
        on conflict (owner, key) do nothing
        "#,
        owner,
        key,
        Json(content) as _,
        creation_datetime,
        revision_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Persists the outcome of folding one more element onto the aggregate,
/// whichever of append / prepend / full-recompute produced it. Always
/// clears `dirty`; a skip (dirty aggregate, or an element filed behind
/// it without triggering a recompute) should not call this at all.
pub async fn update(
    owner: &str,
    key: &str,
    content: &Value,
    creation_datetime: DateTime<Utc>,
    last_revision_hash: &ItemHash,
    last_revision_creation_datetime: DateTime<Utc>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"update aggregates set
            content = $3,
            creation_datetime = $4,
            last_revision_hash = $5,
            last_revision_creation_datetime = $6,
            dirty = false
        where owner = $1 and key = $2
        "#,
        owner,
        key,
        Json(content) as _,
        creation_datetime,
        last_revision_hash.as_str(),
        last_revision_creation_datetime,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Marks `(owner, key)` dirty: an out-of-order element arrived and the
/// next read must recompute from `elements_for` rather than trust the
/// materialized row.
pub async fn mark_dirty(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        "update aggregates set dirty = true where owner = $1 and key = $2",
        owner,
        key,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn delete(
    owner: &str,
    key: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        "delete from aggregates where owner = $1 and key = $2",
        owner,
        key,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn delete_element(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        "delete from aggregate_elements where item_hash = $1",
        item_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[sqlx::test]
    async fn elements_for_is_ordered_oldest_first(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        insert_element(
            &ElementRow {
                item_hash: ItemHash::new("e2"),
                owner: "A".to_string(),
                key: "k".to_string(),
                creation_datetime: at(2),
                content: Json(serde_json::json!({"b": 2})),
            },
            &mut txn,
        )
        .await?;
        insert_element(
            &ElementRow {
                item_hash: ItemHash::new("e1"),
                owner: "A".to_string(),
                key: "k".to_string(),
                creation_datetime: at(1),
                content: Json(serde_json::json!({"a": 1})),
            },
            &mut txn,
        )
        .await?;

        let elements = elements_for("A", "k", &mut txn).await?;
        let hashes: Vec<&str> = elements.iter().map(|e| e.item_hash.as_str()).collect();
        assert_eq!(hashes, vec!["e1", "e2"]);
        Ok(())
    }

    #[sqlx::test]
    async fn create_then_update_then_mark_dirty(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        assert!(!exists("A", "k", &mut txn).await?);

        create(
            "A",
            "k",
            &serde_json::json!({"a": 1}),
            at(1),
            &ItemHash::new("e1"),
            &mut txn,
        )
        .await?;
        assert!(exists("A", "k", &mut txn).await?);

        update("A", "k", &serde_json::json!({"a": 1, "b": 2}), at(1), &ItemHash::new("e2"), at(2), &mut txn)
            .await?;
        let row = get("A", "k", &mut txn).await?.expect("aggregate row");
        assert_eq!(row.content.0, serde_json::json!({"a": 1, "b": 2}));
        assert!(!row.dirty);

        mark_dirty("A", "k", &mut txn).await?;
        let row = get("A", "k", &mut txn).await?.expect("aggregate row");
        assert!(row.dirty);
        Ok(())
    }
}
