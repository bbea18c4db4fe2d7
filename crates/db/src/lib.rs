//! sqlx accessors, one module per domain area, following the same
//! query-module layout used elsewhere in this codebase: a plain row
//! struct per table shape and free functions taking an explicit
//! transaction or pool.

pub mod aggregates;
pub mod balances;
pub mod chain_txs;
pub mod confirmations;
pub mod costs;
pub mod credit_balances;
pub mod files;
pub mod messages;
pub mod pending;
pub mod posts;
pub mod vms;

/// Embeds `migrations/` into the binary so `node migrate` can bring up any
/// database it's pointed at without a separate migration source directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
