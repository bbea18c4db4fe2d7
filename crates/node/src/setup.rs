use crate::config::NodeArgs;
use chains::VerifierRegistry;
use content::{BalancesOracleConfig, ContentLimits, ContentRegistry};
use std::sync::Arc;
use storage::{ContentFetcher, FileSystemEngine};

/// Everything the daemon subcommands share: one connection pool, one
/// storage backend, one content fetcher, and the two dispatch tables they
/// hand down into the pipeline crate's components.
pub struct Runtime {
    pub pool: sqlx::PgPool,
    pub local: Arc<FileSystemEngine>,
    pub fetcher: Arc<ContentFetcher>,
    pub verifiers: Arc<VerifierRegistry>,
    pub registry: Arc<ContentRegistry>,
}

pub async fn build(args: &NodeArgs) -> anyhow::Result<Runtime> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(args.workers as u32 + 4)
        .connect(&args.database_url)
        .await?;

    let local = Arc::new(FileSystemEngine::new(&args.storage_root).await?);
    let fetcher = Arc::new(ContentFetcher::new(local.clone(), None, None));

    let verifiers = Arc::new(
        VerifierRegistry::new()
            .register(chains::TestVerifier)
            .register(chains::EthStubVerifier),
    );

    let registry = Arc::new(ContentRegistry::new(
        fetcher.clone(),
        costs::default_schedule(),
        BalancesOracleConfig {
            post_type: args.balances_post_type.clone(),
            addresses: args.balances_oracle.clone(),
        },
        ContentLimits {
            dirty_threshold: args.dirty_threshold,
            max_file_size: args.max_file_size,
        },
    ));

    Ok(Runtime {
        pool,
        local,
        fetcher,
        verifiers,
        registry,
    })
}
