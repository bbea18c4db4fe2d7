//! Core domain types shared across the node: item hashes, chains, message
//! envelopes and content, and the error/status taxonomy that drives the
//! pending-message retry loop. Kept free of any database or network
//! dependency by default; enable `sqlx-support` to derive `sqlx::Type` for
//! the types that are stored directly in Postgres columns.

pub mod chain;
pub mod content;
pub mod hash;
pub mod message;
pub mod status;
pub mod timestamp;

pub use chain::Chain;
pub use content::Content;
pub use hash::{HashFamily, ItemHash};
pub use message::{ItemType, Message, MessageOrigin, MessageType, RawMessage};
pub use status::{ErrorCode, MessageProcessingError, MessageStatus};
pub use timestamp::timestamp_to_datetime;
