use sha2::{Digest, Sha256};
use std::fmt;

/// ItemHash is the content address of a message or stored file: a lower-case
/// hex digest (64 chars for SHA-256) or an IPFS-style CID string. We don't
/// validate the IPFS multihash family here -- that's `HashFamily`'s job --
/// we just keep the textual form, since both families are used as opaque
/// primary keys throughout the pipeline.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemHash(String);

impl ItemHash {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Computes the SHA-256 digest of `bytes` and returns it as an ItemHash.
    pub fn sha256(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(digest))
    }

    /// Returns true if `bytes` hashes to this ItemHash under SHA-256.
    pub fn matches_sha256(&self, bytes: &[u8]) -> bool {
        Self::sha256(bytes) == *self
    }

    /// A naive guess at the hash family from the string shape, used to route
    /// storage/ipfs fetches. Real IPFS CIDs are base58/base32 and don't look
    /// like hex; anything that isn't 64 lower-hex chars is treated as IPFS.
    pub fn guess_family(&self) -> HashFamily {
        if self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit()) {
            HashFamily::Sha256
        } else {
            HashFamily::Ipfs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFamily {
    Sha256,
    Ipfs,
}

impl fmt::Display for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl std::str::FromStr for ItemHash {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ItemHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ItemHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ItemHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for ItemHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self)
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Type<sqlx::Postgres> for ItemHash {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Encode<'_, sqlx::Postgres> for ItemHash {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <String as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(feature = "sqlx-support")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ItemHash {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        <String as sqlx::Decode<'r, sqlx::Postgres>>::decode(value).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_binding() {
        let hash = ItemHash::sha256(b"hello world");
        assert_eq!(
            hash.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde"
        );
        assert!(hash.matches_sha256(b"hello world"));
        assert!(!hash.matches_sha256(b"goodbye world"));
        assert_eq!(hash.guess_family(), HashFamily::Sha256);
    }

    #[test]
    fn non_hex_is_ipfs_family() {
        let hash = ItemHash::new("QmSomeBase58LookingCidValue");
        assert_eq!(hash.guess_family(), HashFamily::Ipfs);
    }
}
