use crate::hash::ItemHash;
use serde::{Deserialize, Serialize};

/// Content of a FORGET message: marks one or more prior messages (by hash)
/// and/or aggregate keys as forgotten. At least one of `hashes`/`aggregates`
/// must be non-empty; the handler rejects an empty forget rather than
/// silently accepting a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetContent {
    pub address: String,
    #[serde(default)]
    pub hashes: Vec<ItemHash>,
    #[serde(default)]
    pub aggregates: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub time: f64,
}

impl ForgetContent {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.aggregates.is_empty()
    }
}
