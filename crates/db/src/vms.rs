use chrono::{DateTime, Utc};
use models::ItemHash;
use serde_json::Value;
use sqlx::types::Json;

/// A PROGRAM/INSTANCE descriptor row (spec §3.6). `content` is the typed
/// `ExecutableContent` payload, stored as JSON since the two message types
/// don't share a table-friendly column set. `replaces` is pulled out of
/// that JSON into its own column since amend-chain validation (spec §4.8)
/// needs to filter and order by it directly.
#[derive(Debug)]
pub struct VmRow {
    pub item_hash: ItemHash,
    pub owner: String,
    pub is_instance: bool,
    pub content: Json<Value>,
    pub creation_datetime: DateTime<Utc>,
    pub allow_amend: bool,
    pub replaces: Option<ItemHash>,
}

pub async fn insert(
    vm: &VmRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into vms (item_hash, owner, is_instance, content, creation_datetime, allow_amend, replaces)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (item_hash) do nothing
        "#,
        vm.item_hash.as_str(),
        vm.owner,
        vm.is_instance,
        vm.content as _,
        vm.creation_datetime,
        vm.allow_amend,
        vm.replaces.as_ref().map(|h| h.as_str()),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<VmRow>> {
    sqlx::query_as!(
        VmRow,
        r#"select
            item_hash as "item_hash: ItemHash",
            owner,
            is_instance,
            content as "content: Json<Value>",
            creation_datetime,
            allow_amend,
            replaces as "replaces: ItemHash"
        from vms
        where item_hash = $1
        "#,
        item_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await
}

pub async fn delete(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from vms where item_hash = $1", item_hash.as_str())
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Records `vm_hash`'s volume refs so `dependent_vm` can find it later.
/// Replaces whatever set was recorded before, since an amend's volume list
/// can differ from what it replaces.
pub async fn set_volumes(
    vm_hash: &ItemHash,
    file_hashes: &[ItemHash],
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from vm_volumes where vm_item_hash = $1", vm_hash.as_str())
        .execute(&mut **txn)
        .await?;
    for file_hash in file_hashes {
        sqlx::query!(
            r#"insert into vm_volumes (vm_item_hash, file_hash)
            values ($1, $2)
            on conflict (vm_item_hash, file_hash) do nothing
            "#,
            vm_hash.as_str(),
            file_hash.as_str(),
        )
        .execute(&mut **txn)
        .await?;
    }
    Ok(())
}

/// The item_hash of a live VM still mounting `file_hash` as a volume, if
/// any (spec §4.9: a FORGET of that file must be rejected while one does).
pub async fn dependent_vm(
    file_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<ItemHash>> {
    struct Row {
        vm_item_hash: ItemHash,
    }
    let row = sqlx::query_as!(
        Row,
        r#"select vm_item_hash as "vm_item_hash: ItemHash" from vm_volumes
        where file_hash = $1
        limit 1
        "#,
        file_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(|r| r.vm_item_hash))
}

/// Every amend of `original_hash` still on record, newest first.
pub async fn amends_of(
    original_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Vec<ItemHash>> {
    struct Row {
        item_hash: ItemHash,
    }
    let rows = sqlx::query_as!(
        Row,
        r#"select item_hash as "item_hash: ItemHash" from vms
        where replaces = $1
        order by creation_datetime desc
        "#,
        original_hash.as_str(),
    )
    .fetch_all(&mut **txn)
    .await?;
    Ok(rows.into_iter().map(|r| r.item_hash).collect())
}

/// Tracks the current head of an amend chain for a VM: `head_hash` always
/// points at the most recently committed amend (or the original, absent
/// any amend).
pub async fn set_head(
    original_hash: &ItemHash,
    head_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into vm_versions (original_hash, head_hash)
        values ($1, $2)
        on conflict (original_hash) do update set head_hash = excluded.head_hash
        "#,
        original_hash.as_str(),
        head_hash.as_str(),
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get_head(
    original_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Option<ItemHash>> {
    struct Row {
        head_hash: ItemHash,
    }
    let row = sqlx::query_as!(
        Row,
        r#"select head_hash as "head_hash: ItemHash" from vm_versions where original_hash = $1"#,
        original_hash.as_str(),
    )
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(|r| r.head_hash))
}

/// Recomputes `original_hash`'s head from the amends still on record:
/// whichever remaining amend is newest, or `original_hash` itself if none
/// remain (spec §4.8: deleting an update refreshes `VmVersion` to the
/// previous head).
pub async fn recompute_head(
    original_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    let remaining = amends_of(original_hash, txn).await?;
    let head = remaining.first().cloned().unwrap_or_else(|| original_hash.clone());
    set_head(original_hash, &head, txn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(item_hash: &str, owner: &str, replaces: Option<&ItemHash>) -> VmRow {
        VmRow {
            item_hash: ItemHash::new(item_hash),
            owner: owner.to_string(),
            is_instance: false,
            content: Json(serde_json::json!({})),
            creation_datetime: chrono::Utc::now(),
            allow_amend: true,
            replaces: replaces.cloned(),
        }
    }

    #[sqlx::test]
    async fn amends_of_orders_newest_first(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let original = ItemHash::new("vm1");
        insert(&row("vm1", "A", None), &mut txn).await?;
        insert(&row("vm2", "A", Some(&original)), &mut txn).await?;
        insert(&row("vm3", "A", Some(&original)), &mut txn).await?;

        let amends = amends_of(&original, &mut txn).await?;
        assert_eq!(amends.len(), 2);
        Ok(())
    }

    #[sqlx::test]
    async fn recompute_head_falls_back_to_original_once_every_amend_is_gone(
        pool: sqlx::PgPool,
    ) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let original = ItemHash::new("vm1");
        let amend = ItemHash::new("vm2");
        insert(&row("vm1", "A", None), &mut txn).await?;
        insert(&row("vm2", "A", Some(&original)), &mut txn).await?;

        recompute_head(&original, &mut txn).await?;
        assert_eq!(get_head(&original, &mut txn).await?, Some(amend));

        delete(&ItemHash::new("vm2"), &mut txn).await?;
        recompute_head(&original, &mut txn).await?;
        assert_eq!(get_head(&original, &mut txn).await?, Some(original.clone()));
        Ok(())
    }

    #[sqlx::test]
    async fn deleting_a_vm_cascades_to_its_volume_rows(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let vm = ItemHash::new("vm1");
        let file = ItemHash::new("f1");
        insert(&row("vm1", "A", None), &mut txn).await?;
        set_volumes(&vm, &[file.clone()], &mut txn).await?;

        assert_eq!(dependent_vm(&file, &mut txn).await?, Some(vm.clone()));

        delete(&vm, &mut txn).await?;
        assert_eq!(dependent_vm(&file, &mut txn).await?, None);
        Ok(())
    }

    #[sqlx::test]
    async fn set_volumes_replaces_the_previous_set(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let vm = ItemHash::new("vm1");
        let old_file = ItemHash::new("f1");
        let new_file = ItemHash::new("f2");
        insert(&row("vm1", "A", None), &mut txn).await?;

        set_volumes(&vm, &[old_file.clone()], &mut txn).await?;
        set_volumes(&vm, &[new_file.clone()], &mut txn).await?;

        assert_eq!(dependent_vm(&old_file, &mut txn).await?, None);
        assert_eq!(dependent_vm(&new_file, &mut txn).await?, Some(vm));
        Ok(())
    }
}
