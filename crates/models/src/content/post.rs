use crate::hash::ItemHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content of a POST message. `post_type` is a free-form tag ("amend" is
/// reserved and marks this post as amending `reference`); anything else is
/// an original post, or -- if it matches the configured
/// `balances_post_type` from an oracle address -- a balance snapshot post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostContent {
    pub address: String,
    #[serde(rename = "type")]
    pub post_type: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ItemHash>,
    pub content: Value,
    pub time: f64,
}

impl PostContent {
    pub const AMEND_TYPE: &'static str = "amend";

    pub fn is_amend(&self) -> bool {
        self.post_type == Self::AMEND_TYPE
    }
}

/// Content of a balance-oracle POST, parsed out of `PostContent::content`
/// when `post_type == balances_post_type` and `address` is a configured
/// oracle. Malformed balance posts are rejected (`InvalidMessageFormat`)
/// rather than silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesPostContent {
    pub chain: String,
    pub main_height: i64,
    #[serde(default)]
    pub dapp: Option<String>,
    pub balances: std::collections::BTreeMap<String, rust_decimal::Decimal>,
}
