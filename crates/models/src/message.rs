use crate::chain::Chain;
use crate::content::Content;
use crate::hash::ItemHash;
use serde::{Deserialize, Serialize};

/// The six message types this node understands. Closed set, dispatched by
/// the `content` crate's handler registry -- never by runtime type
/// introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx-support", sqlx(type_name = "message_type", rename_all = "UPPERCASE"))]
pub enum MessageType {
    Aggregate,
    Post,
    Store,
    Program,
    Instance,
    Forget,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Aggregate => "AGGREGATE",
            MessageType::Post => "POST",
            MessageType::Store => "STORE",
            MessageType::Program => "PROGRAM",
            MessageType::Instance => "INSTANCE",
            MessageType::Forget => "FORGET",
        }
    }

    /// STORE, PROGRAM and INSTANCE are the only types gated by balance.
    pub fn is_resource_bearing(&self) -> bool {
        matches!(
            self,
            MessageType::Store | MessageType::Program | MessageType::Instance
        )
    }
}

/// Where a message's content body lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx-support", sqlx(type_name = "item_type", rename_all = "lowercase"))]
pub enum ItemType {
    Inline,
    Storage,
    Ipfs,
}

/// Where a pending message originated from, which decides whether its
/// signature must be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx-support", sqlx(type_name = "message_origin", rename_all = "lowercase"))]
pub enum MessageOrigin {
    P2p,
    Api,
    OnChain,
}

impl MessageOrigin {
    /// Trusted on-chain events bypass signature verification: the chain
    /// itself is the authenticator.
    pub fn is_trusted(&self) -> bool {
        matches!(self, MessageOrigin::OnChain)
    }
}

/// The raw, wire-level envelope of a message, before `item_content` has been
/// parsed into a typed `Content`. The fetcher turns a `RawMessage` into a
/// `Message` once the body is resolved and decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub item_hash: ItemHash,
    pub sender: String,
    pub chain: Chain,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub item_type: ItemType,
    /// Present iff `item_type == Inline`. The exact bytes whose SHA-256
    /// equals `item_hash`.
    pub item_content: Option<String>,
    pub signature: Option<String>,
    pub time: f64,
    pub channel: Option<String>,
}

/// A message with its content fully resolved and parsed -- the unit the
/// content-handler dispatch and commit coordinator operate on.
#[derive(Debug, Clone)]
pub struct Message {
    pub item_hash: ItemHash,
    pub sender: String,
    pub chain: Chain,
    pub message_type: MessageType,
    pub item_type: ItemType,
    pub item_content: Option<String>,
    pub signature: Option<String>,
    pub time: f64,
    pub channel: Option<String>,
    pub content: Content,
    pub size: i64,
}

impl Message {
    pub fn from_raw(raw: RawMessage, content: Content, size: i64) -> Self {
        Self {
            item_hash: raw.item_hash,
            sender: raw.sender,
            chain: raw.chain,
            message_type: raw.message_type,
            item_type: raw.item_type,
            item_content: raw.item_content,
            signature: raw.signature,
            time: raw.time,
            channel: raw.channel,
            content,
            size,
        }
    }

    /// Address that "owns" the content -- the value checked against
    /// `sender` by default permission checks (§4.4). This is usually equal
    /// to `sender`, but message content carries its own `address` field so
    /// that delegated senders can be supported uniformly.
    pub fn content_address(&self) -> &str {
        self.content.address()
    }
}
