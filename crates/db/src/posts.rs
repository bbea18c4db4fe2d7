use chrono::{DateTime, Utc};
use models::ItemHash;
use serde_json::Value;
use sqlx::types::Json;

/// A POST message row, original or amend (spec §3.6). `latest_amend`
/// tracks the most recent amend's hash for the original; `None` on a post
/// that is itself an amend.
#[derive(Debug)]
pub struct PostRow {
    pub item_hash: ItemHash,
    pub owner: String,
    pub post_type: String,
    pub reference: Option<ItemHash>,
    pub content: Json<Value>,
    pub creation_datetime: DateTime<Utc>,
    pub latest_amend: Option<ItemHash>,
}

pub async fn insert(
    item_hash: &ItemHash,
    owner: &str,
    post_type: &str,
    reference: Option<&ItemHash>,
    content: &Value,
    creation_datetime: DateTime<Utc>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into posts (item_hash, owner, post_type, reference, content, creation_datetime, latest_amend)
        values ($1, $2, $3, $4, $5, $6, null)
        on conflict (item_hash) do nothing
        "#,
        item_hash.as_str(),
        owner,
        post_type,
        reference.map(|h| h.as_str()),
        Json(content) as _,
        creation_datetime,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<PostRow>> {
    sqlx::query_as!(
        PostRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            owner,
            post_type,
            reference as "reference: ItemHash",
            content as "content: Json<Value>",
            creation_datetime,
            latest_amend as "latest_amend: ItemHash"
        from posts
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await
}

/// Points the original post's `latest_amend` at `amend_hash` if
/// `amend_time` is newer than the original's current amend (or, absent
/// any amend yet, the original itself), so concurrent amends converge on
/// whichever has the latest `creation_datetime` regardless of commit
/// order.
pub async fn advance_latest_amend(
    original_hash: &ItemHash,
    amend_hash: &ItemHash,
    amend_time: DateTime<Utc>,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"update posts set latest_amend = $2
        where item_hash = $1
          and $3 > coalesce(
              (select p2.creation_datetime from posts p2 where p2.item_hash = posts.latest_amend),
              creation_datetime
          )
        "#,
        original_hash.as_str(),
        amend_hash.as_str(),
        amend_time,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Every amend referencing `original_hash`, used by the FORGET cascade
/// (spec §4.6: forgetting an original forgets all its amends too).
pub async fn amends_of(
    original_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Vec<ItemHash>> {
    struct Row {
        item_hash: ItemHash,
    }
    let rows = sqlx::query_as!(
        Row,
        r#"select item_hash as "item_hash: ItemHash" from posts where reference = $1"#,
        original_hash.as_str(),
    )
    .fetch_all(&mut **txn)
    .await?;
    Ok(rows.into_iter().map(|r| r.item_hash).collect())
}

pub async fn delete(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from posts where item_hash = $1", item_hash.as_str())
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Recomputes `latest_amend` for `original_hash` from the amends that
/// still exist, picking the one with the latest `creation_datetime` (or
/// clearing the pointer if none remain).
pub async fn recompute_latest_amend(
    original_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"update posts set latest_amend = (
            select p2.item_hash from posts p2
            where p2.reference = $1
            order by p2.creation_datetime desc
            limit 1
        )
        where item_hash = $1
        "#,
        original_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}
