use crate::hash::ItemHash;
use crate::message::ItemType;
use serde::{Deserialize, Serialize};

/// Content of a STORE message: a pointer to a file to pin, optionally
/// amending a previously stored file via `reference`. Update trees (an
/// amend of an amend) are forbidden -- see
/// `MessageProcessingError::StoreCannotUpdateStoreWithRef`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreContent {
    pub address: String,
    pub item_type: ItemType,
    pub item_hash: ItemHash,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ItemHash>,
    #[serde(default)]
    pub size: Option<i64>,
    pub time: f64,
}
