//! Cost computation and balance gating for resource-bearing messages
//! (STORE, PROGRAM, INSTANCE): the active pricing schedule, compute/storage
//! cost formulas, and the balance check the content handlers call before
//! committing such a message.

pub mod balance;
pub mod compute;
pub mod constants;
pub mod schedule;

pub use balance::{check_balance, BalanceSource};
pub use compute::{compute_hold_cost, compute_store_hold_cost, volume_size, CostError, FileSizeResolver};
pub use schedule::{default_schedule, PricingSchedule, ProductPriceType};
