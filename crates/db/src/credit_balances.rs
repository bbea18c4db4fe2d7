use rust_decimal::Decimal;

/// The pre-purchased credit ledger (spec §4.13), refreshed wholesale by the
/// balance refresh job's optional second feed. Schema mirrors `balances`
/// exactly; kept as a separate table rather than a column there so the two
/// feeds can be refreshed independently without one job's absence zeroing
/// out the other's data.
#[derive(Debug)]
pub struct CreditBalanceRow {
    pub address: String,
    pub chain: String,
    pub dapp: String,
    pub balance: Decimal,
    pub eth_height: i64,
}

pub async fn upsert(
    row: &CreditBalanceRow,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query!(
        r#"insert into credit_balances (address, chain, dapp, balance, eth_height)
        values ($1, $2, $3, $4, $5)
        on conflict (address, chain, dapp) do update set
            balance = excluded.balance,
            eth_height = excluded.eth_height
        where excluded.eth_height >= credit_balances.eth_height
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

pub async fn get(address: &str, pool: &sqlx::PgPool) -> sqlx::Result<Decimal> {
    let total: Option<Decimal> = sqlx::query_scalar!(
        r#"select sum(balance) as "total: Decimal" from credit_balances where address = $1"#,
        address,
    )
    .fetch_one(pool)
    .await?;
    Ok(total.unwrap_or(Decimal::ZERO))
}
