use models::ItemHash;
use rust_decimal::Decimal;

/// A per-message computed cost row (spec §3.7), kept so a later FORGET (or
/// balance audit) can see exactly what was charged without recomputing
/// against a pricing schedule that may since have changed.
#[derive(Debug)]
pub struct AccountCostRow {
    pub item_hash: ItemHash,
    pub owner: String,
    pub cost_hold: Decimal,
    pub cost_stream: Decimal,
}

pub async fn insert(
    row: &AccountCostRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into account_costs (item_hash, owner, cost_hold, cost_stream)
        values ($1, $2, $3, $4)
        on conflict (item_hash) do nothing
        "#,
        row.item_hash.as_str(),
        row.owner,
        row.cost_hold,
        row.cost_stream,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Sum of `cost_hold` across every message currently attributed to
/// `owner`, the figure the balance gate compares a new item's hold cost
/// against.
pub async fn total_held(
    owner: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Decimal> {
    let total: Option<Decimal> = sqlx::query_scalar!(
        r#"select sum(cost_hold) as "total: Decimal" from account_costs where owner = $1"#,
        owner,
    )
    .fetch_one(&mut **txn)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}

pub async fn remove(
    item_hash: &ItemHash,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!("delete from account_costs where item_hash = $1", item_hash.as_str())
        .execute(&mut **txn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn total_held_sums_every_row_for_the_owner(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        insert(
            &AccountCostRow {
                item_hash: ItemHash::new("m1"),
                owner: "A".to_string(),
                cost_hold: Decimal::new(100, 2),
                cost_stream: Decimal::ZERO,
            },
            &mut txn,
        )
        .await?;
        insert(
            &AccountCostRow {
                item_hash: ItemHash::new("m2"),
                owner: "A".to_string(),
                cost_hold: Decimal::new(50, 2),
                cost_stream: Decimal::ZERO,
            },
            &mut txn,
        )
        .await?;
        insert(
            &AccountCostRow {
                item_hash: ItemHash::new("m3"),
                owner: "B".to_string(),
                cost_hold: Decimal::new(900, 2),
                cost_stream: Decimal::ZERO,
            },
            &mut txn,
        )
        .await?;

        assert_eq!(total_held("A", &mut txn).await?, Decimal::new(150, 2));
        assert_eq!(total_held("nobody", &mut txn).await?, Decimal::ZERO);
        Ok(())
    }

    #[sqlx::test]
    async fn remove_reclaims_the_row_from_total_held(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        let item_hash = ItemHash::new("m1");
        insert(
            &AccountCostRow {
                item_hash: item_hash.clone(),
                owner: "A".to_string(),
                cost_hold: Decimal::new(100, 2),
                cost_stream: Decimal::ZERO,
            },
            &mut txn,
        )
        .await?;
        assert_eq!(total_held("A", &mut txn).await?, Decimal::new(100, 2));

        remove(&item_hash, &mut txn).await?;
        assert_eq!(total_held("A", &mut txn).await?, Decimal::ZERO);
        Ok(())
    }
}
