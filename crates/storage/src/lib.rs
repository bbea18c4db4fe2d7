//! Content-addressed blob resolution: a local cache backend plus a
//! single-flight fetcher that falls back to the p2p network and an IPFS
//! gateway, verifying every result against its claimed hash before it is
//! cached or handed to a caller.

pub mod backend;
pub mod error;
pub mod fetch;
pub mod filesystem;
pub mod ipfs;

pub use backend::StorageEngine;
pub use error::StorageError;
pub use fetch::{ContentFetcher, FetchSource, P2pContentSource};
pub use filesystem::FileSystemEngine;
pub use ipfs::IpfsClient;
