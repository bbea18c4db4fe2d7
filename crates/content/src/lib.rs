//! Per-type message content handlers (spec §4.4-§4.9): one `ContentHandler`
//! implementation per `MessageType`, dispatched by `ContentRegistry` and
//! invoked by the commit coordinator inside its single transaction per
//! committed message.

pub mod aggregate;
pub mod decode;
pub mod error;
pub mod forget;
pub mod handler;
pub mod permission;
pub mod post;
pub mod registry;
pub mod store;
pub mod vm;

pub use error::{HandlerError, HandlerResult};
pub use handler::ContentHandler;
pub use registry::{BalancesOracleConfig, ContentLimits, ContentRegistry};
