//! The message-processing pipeline (spec §4.3-§4.14): resolves pending
//! messages' content, dispatches them through the commit coordinator, and
//! runs the background jobs that keep the node's state consistent --
//! chain-event ingestion, garbage collection, and balance refresh.

pub mod balance_job;
pub mod coordinator;
pub mod fetcher;
pub mod gc;
pub mod ingestor;
pub mod worker;

pub use balance_job::{BalanceFeed, BalanceRefreshJob, BalanceSnapshot};
pub use coordinator::{CommitError, Trigger};
pub use gc::GarbageCollector;
pub use ingestor::{ChainEvent, ChainTx, IngestError};
pub use worker::WorkerPool;
