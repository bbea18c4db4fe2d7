use rust_decimal::Decimal;

/// One account's balance snapshot, keyed by `(address, chain, dapp)` (spec
/// §3.7). Refreshed wholesale by the balance refresh job (spec §4.13),
/// never debited by message processing.
#[derive(Debug)]
pub struct BalanceRow {
    pub address: String,
    pub chain: String,
    /// `""` for the chain's native balance; a dapp/contract tag otherwise.
    /// Never `NULL` at the storage layer, since a nullable column can't
    /// sit in the `(address, chain, dapp)` primary key.
    pub dapp: String,
    pub balance: Decimal,
    pub eth_height: i64,
}

pub async fn upsert(
    row: &BalanceRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into balances (address, chain, dapp, balance, eth_height)
        values ($1, $2, $3, $4, $5)
        on conflict (address, chain, dapp) do update set
            balance = excluded.balance,
            eth_height = excluded.eth_height
        where excluded.eth_height >= balances.eth_height
        "#,
        row.address,
        row.chain,
        row.dapp,
        row.balance,
        row.eth_height,
    )
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get(
    address: &str,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Decimal> {
    let total: Option<Decimal> = sqlx::query_scalar!(
        r#"select sum(balance) as "total: Decimal" from balances where address = $1"#,
        address,
    )
    .fetch_one(pool)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}

/// Same as `get`, but against the commit coordinator's open transaction --
/// the balance gate (spec §4.10) runs inside the same transaction as the
/// rest of the message's processing, so it can't borrow a separate pool
/// connection.
pub async fn get_in_txn(
    address: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Decimal> {
    let total: Option<Decimal> = sqlx::query_scalar!(
        r#"select sum(balance) as "total: Decimal" from balances where address = $1"#,
        address,
    )
    .fetch_one(&mut **txn)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}

/// Adapts the `balances` table to `costs::BalanceSource` for the cost
/// gate. Synchronous by construction (the trait has no async method), so
/// the caller must snapshot balances for the senders it's about to check
/// before invoking the gate -- see `pipeline`'s commit coordinator.
pub struct BalanceSnapshot(std::collections::HashMap<String, Decimal>);

impl BalanceSnapshot {
    pub fn new(entries: std::collections::HashMap<String, Decimal>) -> Self {
        Self(entries)
    }
}

impl costs::BalanceSource for BalanceSnapshot {
    fn balance_of(&self, address: &str) -> Decimal {
        self.0.get(address).copied().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: &str, dapp: &str, balance: i64, eth_height: i64) -> BalanceRow {
        BalanceRow {
            address: address.to_string(),
            chain: "ETH".to_string(),
            dapp: dapp.to_string(),
            balance: Decimal::from(balance),
            eth_height,
        }
    }

    #[sqlx::test]
    async fn get_sums_native_and_dapp_balances(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        upsert(&row("A", "", 100, 1), &mut txn).await?;
        upsert(&row("A", "some-dapp", 25, 1), &mut txn).await?;

        assert_eq!(get_in_txn("A", &mut txn).await?, Decimal::from(125));
        Ok(())
    }

    #[sqlx::test]
    async fn upsert_never_moves_eth_height_backwards(pool: sqlx::PgPool) -> sqlx::Result<()> {
        let mut txn = pool.begin().await?;
        upsert(&row("A", "", 100, 10), &mut txn).await?;
        upsert(&row("A", "", 50, 5), &mut txn).await?;

        assert_eq!(get_in_txn("A", &mut txn).await?, Decimal::from(100));

        upsert(&row("A", "", 200, 11), &mut txn).await?;
        assert_eq!(get_in_txn("A", &mut txn).await?, Decimal::from(200));
        Ok(())
    }

    #[test]
    fn balance_snapshot_defaults_unknown_addresses_to_zero() {
        let snapshot = BalanceSnapshot::new(std::collections::HashMap::from([(
            "A".to_string(),
            Decimal::from(42),
        )]));
        assert_eq!(costs::BalanceSource::balance_of(&snapshot, "A"), Decimal::from(42));
        assert_eq!(costs::BalanceSource::balance_of(&snapshot, "B"), Decimal::ZERO);
    }
}
