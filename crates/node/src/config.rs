use std::time::Duration;

/// Flags shared by every subcommand (spec §9.2), mirroring the teacher's
/// `agent/src/main.rs` single flat `Args` struct rather than one per
/// subcommand: `ccn migrate` only reads `database_url`, but the daemon
/// commands need the rest, and duplicating the flag surface per subcommand
/// would just make the three commands drift.
#[derive(clap::Args, Debug)]
pub struct NodeArgs {
    /// URL of the Postgres database.
    #[arg(long = "database", env = "DATABASE_URL")]
    pub database_url: String,

    /// Root directory the local storage backend reads/writes blobs under.
    #[arg(long = "storage-root", env = "STORAGE_ROOT", default_value = "./data/storage")]
    pub storage_root: std::path::PathBuf,

    /// Number of pending messages processed concurrently by the worker
    /// pool.
    #[arg(long = "workers", env = "WORKERS", default_value = "8")]
    pub workers: usize,

    /// Rows claimed per worker-pool poll.
    #[arg(long = "batch-size", env = "BATCH_SIZE", default_value = "32")]
    pub batch_size: i64,

    /// How long an idle worker pool sleeps between polls when the queue is
    /// empty.
    #[arg(long = "dequeue-interval", env = "DEQUEUE_INTERVAL", value_parser = humantime::parse_duration, default_value = "1s")]
    pub dequeue_interval: Duration,

    /// How long a claimed row is leased before it becomes reclaimable again
    /// -- must comfortably exceed the time a single message takes to
    /// fetch, verify, and commit.
    #[arg(long = "heartbeat-timeout", env = "HEARTBEAT_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    pub heartbeat_timeout: Duration,

    /// Retries allowed for a retryable failure before it becomes a
    /// terminal `MaxRetriesExceeded` reject.
    #[arg(long = "max-retries", env = "MAX_RETRIES", default_value = "10")]
    pub max_retries: u32,

    /// Minimum back-off delay between retries.
    #[arg(long = "retry-backoff-min", env = "RETRY_BACKOFF_MIN", value_parser = humantime::parse_duration, default_value = "1s")]
    pub retry_backoff_min: Duration,

    /// Maximum back-off delay between retries.
    #[arg(long = "retry-backoff-max", env = "RETRY_BACKOFF_MAX", value_parser = humantime::parse_duration, default_value = "5m")]
    pub retry_backoff_max: Duration,

    /// How often the garbage collector sweeps for unpinned blobs.
    #[arg(long = "gc-interval", env = "GC_INTERVAL", value_parser = humantime::parse_duration, default_value = "1h")]
    pub gc_interval: Duration,

    /// Rows the garbage collector considers per sweep.
    #[arg(long = "gc-batch-size", env = "GC_BATCH_SIZE", default_value = "256")]
    pub gc_batch_size: i64,

    /// How often the balance refresh job pulls from its feed(s).
    #[arg(
        long = "balance-refresh-interval",
        env = "BALANCE_REFRESH_INTERVAL",
        value_parser = humantime::parse_duration,
        default_value = "5m"
    )]
    pub balance_refresh_interval: Duration,

    /// Cap, in bytes, on an authenticated STORE message's fetched content
    /// (spec §4.7).
    #[arg(long = "max-file-size", env = "MAX_FILE_SIZE", default_value_t = content::store::DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: i64,

    /// Elements an AGGREGATE can hold before an out-of-order arrival marks
    /// it dirty instead of paying for a full recompute (spec §4.5).
    #[arg(long = "dirty-threshold", env = "DIRTY_THRESHOLD", default_value_t = content::aggregate::DEFAULT_DIRTY_THRESHOLD)]
    pub dirty_threshold: i64,

    /// POST `type` tag the POST handler treats as the balance oracle feed
    /// (spec §4.6, §4.13).
    #[arg(long = "balances-post-type", env = "BALANCES_POST_TYPE", default_value = "balances")]
    pub balances_post_type: String,

    /// Address(es) authorized to publish balance-oracle POSTs. May be
    /// repeated.
    #[arg(long = "balances-oracle", env = "BALANCES_ORACLE", value_delimiter = ',')]
    pub balances_oracle: Vec<String>,

    /// Endpoint the balance refresh job GETs a JSON snapshot of account
    /// balances from (spec §4.13). Left unset, the balance refresh job
    /// doesn't run -- this repo has no canonical indexer built in, and the
    /// cost gate only reads what `db::balances` already holds.
    #[arg(long = "balance-indexer-url", env = "BALANCE_INDEXER_URL")]
    pub balance_indexer_url: Option<url::Url>,

    /// Same as `--balance-indexer-url` for the optional pre-purchased
    /// credit ledger.
    #[arg(long = "credit-indexer-url", env = "CREDIT_INDEXER_URL")]
    pub credit_indexer_url: Option<url::Url>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        node: NodeArgs,
    }

    #[test]
    fn defaults_apply_when_only_database_is_given() {
        let cli = TestCli::try_parse_from(["ccn", "--database", "postgres://x/y"]).unwrap();
        assert_eq!(cli.node.workers, 8);
        assert_eq!(cli.node.batch_size, 32);
        assert_eq!(cli.node.max_retries, 10);
        assert_eq!(cli.node.dequeue_interval, Duration::from_secs(1));
        assert_eq!(cli.node.gc_interval, Duration::from_secs(3600));
        assert_eq!(cli.node.max_file_size, content::store::DEFAULT_MAX_FILE_SIZE);
        assert_eq!(cli.node.dirty_threshold, content::aggregate::DEFAULT_DIRTY_THRESHOLD);
        assert!(cli.node.balance_indexer_url.is_none());
        assert!(cli.node.balances_oracle.is_empty());
    }

    #[test]
    fn balances_oracle_accepts_a_comma_delimited_list() {
        let cli = TestCli::try_parse_from([
            "ccn",
            "--database",
            "postgres://x/y",
            "--balances-oracle",
            "0xa,0xb,0xc",
        ])
        .unwrap();
        assert_eq!(cli.node.balances_oracle, vec!["0xa", "0xb", "0xc"]);
    }

    #[test]
    fn missing_database_is_rejected() {
        assert!(TestCli::try_parse_from(["ccn"]).is_err());
    }
}
