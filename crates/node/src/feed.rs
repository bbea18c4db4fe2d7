use async_trait::async_trait;
use pipeline::{BalanceFeed, BalanceSnapshot};
use url::Url;

/// Pulls a full balance snapshot from an HTTP indexer, grounded on
/// `storage::IpfsClient`'s thin-wrapper-over-`reqwest` shape. The endpoint
/// is expected to return a JSON array matching `BalanceSnapshot`'s fields;
/// this node has no opinion on which indexer serves it.
pub struct HttpBalanceFeed {
    url: Url,
    http: reqwest::Client,
}

impl HttpBalanceFeed {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl BalanceFeed for HttpBalanceFeed {
    async fn pull(&self) -> anyhow::Result<Vec<BalanceSnapshot>> {
        let rows: Vec<BalanceSnapshot> = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows)
    }
}
