use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of an upstream dependency call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream response decode error: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether a retry could plausibly succeed. Client-side 4xx answers will
    /// not change on retry; timeouts, transport faults and 5xx might.
    pub fn retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::Transport(_) => true,
            UpstreamError::Status(code) => *code >= 500,
            UpstreamError::Decode(_) => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SupplierRecord {
    pub supplier_id: String,
    pub name: String,
    pub status: String,
}

/// Capability handle for the supplier directory. The service layer only ever
/// talks to the outside world through this trait; what is on the other side
/// is not this crate's concern.
#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn fetch_supplier(&self, id: &str, deadline: Duration) -> Result<SupplierRecord, UpstreamError>;
}

/// Production implementation: HTTP directory at a configured base URL.
pub struct HttpSupplierDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSupplierDirectory {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SupplierDirectory for HttpSupplierDirectory {
    async fn fetch_supplier(&self, id: &str, deadline: Duration) -> Result<SupplierRecord, UpstreamError> {
        let url = format!("{}/suppliers/{}", self.base_url, id);
        let resp = self
            .client
            .get(&url)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }
        resp.json::<SupplierRecord>().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Decode(e.to_string())
            }
        })
    }
}
