use async_trait::async_trait;
use db::balances::BalanceRow;
use db::credit_balances::CreditBalanceRow;
use rust_decimal::Decimal;
use std::time::Duration;

/// One account's balance as reported by an external chain indexer, keyed
/// the same way as the stored row (spec §4.13).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BalanceSnapshot {
    pub address: String,
    pub chain: String,
    pub dapp: String,
    pub balance: Decimal,
    pub eth_height: i64,
}

/// The pull side of the balance refresh job: an external indexer this node
/// doesn't own. `db` implements the push side (`balances`/`credit_balances`
/// upserts); this trait is the only thing a deployment needs to supply to
/// wire up a real chain.
#[async_trait]
pub trait BalanceFeed: Send + Sync {
    async fn pull(&self) -> anyhow::Result<Vec<BalanceSnapshot>>;
}

/// Periodically refreshes `balances` from a required feed and, if
/// configured, `credit_balances` from a second feed (spec §4.13).
/// Idempotent: `db::balances::upsert`/`db::credit_balances::upsert` only
/// apply a row when its `eth_height` isn't behind what's already stored,
/// so re-running the same snapshot twice is a no-op.
pub struct BalanceRefreshJob {
    pool: sqlx::PgPool,
    feed: std::sync::Arc<dyn BalanceFeed>,
    credit_feed: Option<std::sync::Arc<dyn BalanceFeed>>,
    interval: Duration,
}

impl BalanceRefreshJob {
    pub fn new(
        pool: sqlx::PgPool,
        feed: std::sync::Arc<dyn BalanceFeed>,
        credit_feed: Option<std::sync::Arc<dyn BalanceFeed>>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            feed,
            credit_feed,
            interval,
        }
    }

    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            if let Err(err) = self.refresh_once().await {
                tracing::error!(?err, "balance refresh failed (will retry)");
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => (),
                () = &mut shutdown => break,
            }
        }
    }

    pub async fn refresh_once(&self) -> anyhow::Result<()> {
        let snapshot = self.feed.pull().await?;
        apply_balances(&snapshot, &self.pool).await?;

        if let Some(credit_feed) = &self.credit_feed {
            let credit_snapshot = credit_feed.pull().await?;
            apply_credit_balances(&credit_snapshot, &self.pool).await?;
        }
        Ok(())
    }
}

async fn apply_balances(snapshot: &[BalanceSnapshot], pool: &sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    for entry in snapshot {
        db::balances::upsert(
            &BalanceRow {
                address: entry.address.clone(),
                chain: entry.chain.clone(),
                dapp: entry.dapp.clone(),
                balance: entry.balance,
                eth_height: entry.eth_height,
            },
            &mut txn,
        )
        .await?;
    }
    txn.commit().await
}

async fn apply_credit_balances(snapshot: &[BalanceSnapshot], pool: &sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    for entry in snapshot {
        db::credit_balances::upsert(
            &CreditBalanceRow {
                address: entry.address.clone(),
                chain: entry.chain.clone(),
                dapp: entry.dapp.clone(),
                balance: entry.balance,
                eth_height: entry.eth_height,
            },
            &mut txn,
        )
        .await?;
    }
    txn.commit().await
}
