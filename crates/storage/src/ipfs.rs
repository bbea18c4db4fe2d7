use bytes::Bytes;
use std::time::Duration;

/// Thin client over an IPFS HTTP gateway's `/api/v0/cat` endpoint. Grounded
/// on `original_source/src/aleph/services/ipfs/storage.py`'s `get_ipfs_content`,
/// minus the pubsub/pinning surface this node doesn't need to republish.
#[derive(Debug, Clone)]
pub struct IpfsClient {
    gateway_base: String,
    http: reqwest::Client,
}

impl IpfsClient {
    pub fn new(gateway_base: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            gateway_base: gateway_base.into(),
            http,
        })
    }

    pub async fn cat(&self, cid: &str) -> anyhow::Result<Option<Bytes>> {
        let url = format!("{}/api/v0/cat?arg={}", self.gateway_base, cid);
        let response = self.http.post(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.bytes().await?))
    }
}
