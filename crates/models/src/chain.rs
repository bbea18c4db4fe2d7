use std::fmt;

/// Chain tags the signature scheme and canonical-form rules used to sign a
/// message. The set of chains is open -- new networks are added without a
/// protocol change -- so unrecognized tags round-trip through `Other`
/// instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Chain {
    Ethereum,
    Avalanche,
    Bsc,
    Solana,
    Nuls2,
    Tezos,
    /// Used only by the trusted-origin pending-message path and tests: a
    /// message whose signature is never checked.
    Test,
    Other(String),
}

impl Chain {
    pub fn as_str(&self) -> &str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Avalanche => "AVAX",
            Chain::Bsc => "BSC",
            Chain::Solana => "SOL",
            Chain::Nuls2 => "NULS2",
            Chain::Tezos => "TEZOS",
            Chain::Test => "TEST",
            Chain::Other(tag) => tag,
        }
    }
}

impl From<&str> for Chain {
    fn from(tag: &str) -> Self {
        match tag {
            "ETH" => Chain::Ethereum,
            "AVAX" => Chain::Avalanche,
            "BSC" => Chain::Bsc,
            "SOL" => Chain::Solana,
            "NULS2" => Chain::Nuls2,
            "TEZOS" => Chain::Tezos,
            "TEST" => Chain::Test,
            other => Chain::Other(other.to_string()),
        }
    }
}

impl std::str::FromStr for Chain {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Chain::from(s))
    }
}

impl TryFrom<String> for Chain {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Chain::from(value.as_str()))
    }
}

impl From<Chain> for String {
    fn from(chain: Chain) -> Self {
        chain.as_str().to_string()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Type<sqlx::Postgres> for Chain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-support")]
impl sqlx::Encode<'_, sqlx::Postgres> for Chain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <String as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(
            &self.as_str().to_string(),
            buf,
        )
    }
}

#[cfg(feature = "sqlx-support")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Chain {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = <String as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(Chain::from(raw.as_str()))
    }
}
