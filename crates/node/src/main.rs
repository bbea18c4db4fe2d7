mod config;
mod feed;
mod setup;

use clap::{Parser, Subcommand};
use config::NodeArgs;

/// `ccn` -- the messaging node daemon: resolves pending messages, commits
/// them, and runs the background jobs that keep stored state consistent
/// (spec §6's CLI surface).
#[derive(Parser, Debug)]
#[command(name = "ccn", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run database migrations and exit.
    Migrate,
    /// Run the worker pool (and, unless `--no-jobs` is set, the garbage
    /// collector and balance refresh jobs) until a shutdown signal arrives.
    Serve {
        /// Leave GC/balance refresh to a separate `run-jobs` process.
        #[arg(long = "no-jobs")]
        no_jobs: bool,
    },
    /// Run only the periodic jobs (garbage collection, balance refresh)
    /// until a shutdown signal arrives, for a split deployment.
    RunJobs,
}

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let cli = Cli::parse();
    tracing::info!(command = ?cli.command, "started");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(cli));
    tracing::info!(?result, "shutting down");
    result
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Migrate => run_migrate(&cli.node).await,
        Command::Serve { no_jobs } => run_serve(&cli.node, no_jobs).await,
        Command::RunJobs => run_jobs(&cli.node).await,
    }
}

async fn run_migrate(args: &NodeArgs) -> anyhow::Result<()> {
    use sqlx::migrate::MigrateDatabase;
    use sqlx::{Connection, PgConnection, Postgres};

    if !Postgres::database_exists(&args.database_url).await? {
        Postgres::create_database(&args.database_url).await?;
    }
    let mut conn = PgConnection::connect(&args.database_url).await?;
    db::MIGRATOR.run(&mut conn).await?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn run_serve(args: &NodeArgs, no_jobs: bool) -> anyhow::Result<()> {
    let rt = setup::build(args).await?;

    let shutdown = shutdown_signal();

    let worker = pipeline::WorkerPool::new(
        rt.pool.clone(),
        rt.fetcher.clone(),
        rt.verifiers.clone(),
        rt.registry.clone(),
        args.workers,
        args.batch_size,
        args.dequeue_interval,
        args.heartbeat_timeout,
        args.max_retries,
        args.retry_backoff_min,
        args.retry_backoff_max,
    );

    if no_jobs {
        worker.run(shutdown).await;
        return Ok(());
    }

    let (worker_shutdown, jobs_shutdown) = fan_out(shutdown);
    tokio::join!(worker.run(worker_shutdown), run_background_jobs(args, &rt, jobs_shutdown));
    Ok(())
}

async fn run_jobs(args: &NodeArgs) -> anyhow::Result<()> {
    let rt = setup::build(args).await?;
    let shutdown = shutdown_signal();
    run_background_jobs(args, &rt, shutdown).await;
    Ok(())
}

async fn run_background_jobs(
    args: &NodeArgs,
    rt: &setup::Runtime,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let gc = pipeline::GarbageCollector::new(
        rt.pool.clone(),
        rt.local.clone(),
        args.gc_interval,
        args.gc_batch_size,
    );

    let Some(balance_feed) = args
        .balance_indexer_url
        .clone()
        .map(crate::feed::HttpBalanceFeed::new)
        .transpose()
        .expect("failed to build balance indexer client")
    else {
        gc.run(shutdown).await;
        return;
    };

    let credit_feed = args
        .credit_indexer_url
        .clone()
        .map(crate::feed::HttpBalanceFeed::new)
        .transpose()
        .expect("failed to build credit indexer client");

    let balance_job = pipeline::BalanceRefreshJob::new(
        rt.pool.clone(),
        std::sync::Arc::new(balance_feed),
        credit_feed.map(|f| std::sync::Arc::new(f) as std::sync::Arc<dyn pipeline::BalanceFeed>),
        args.balance_refresh_interval,
    );

    let (gc_shutdown, balance_shutdown) = fan_out(shutdown);
    tokio::join!(gc.run(gc_shutdown), balance_job.run(balance_shutdown));
}

/// Duplicates a shutdown signal across two independently-awaited loops --
/// each background task needs its own future to `select!` against.
fn fan_out(
    shutdown: impl std::future::Future<Output = ()>,
) -> (
    impl std::future::Future<Output = ()>,
    impl std::future::Future<Output = ()>,
) {
    let notify = std::sync::Arc::new(tokio::sync::Notify::new());
    let a = notify.clone();
    let b = notify.clone();
    tokio::spawn(async move {
        shutdown.await;
        notify.notify_waiters();
    });
    (async move { a.notified().await }, async move { b.notified().await })
}

/// Waits for SIGINT/SIGTERM, matching the teacher's graceful-shutdown
/// convention in its other long-running daemons.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_wakes_both_futures_once() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let (a, b) = fan_out(async move {
            let _ = rx.await;
        });

        tx.send(()).unwrap();
        tokio::join!(a, b);
    }

    #[tokio::test]
    async fn fan_out_does_not_wake_before_shutdown_resolves() {
        let (a, _b) = fan_out(std::future::pending::<()>());
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), a).await.is_err());
    }
}
