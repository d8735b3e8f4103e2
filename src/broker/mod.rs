//! The single-slot location broker: the HTTP server that holds the latest
//! sample, and the client both sessions use to reach it.

pub mod server;

pub use server::{router, serve, LatestSlot};

use crate::error::{SyncError, SyncResult};
use crate::types::PositionSample;
use std::future::Future;
use std::time::Duration;

/// Where the receiver pulls the latest sample from.
pub trait SampleSource: Send + Sync {
    /// The latest stored sample, `Ok(None)` when nothing has been produced yet.
    fn latest(&self) -> impl Future<Output = SyncResult<Option<PositionSample>>> + Send;
}

/// Where the sender pushes fresh samples to.
pub trait SampleSink: Send + Sync {
    fn push(&self, sample: &PositionSample) -> impl Future<Output = SyncResult<()>> + Send;
}

/// HTTP client for the broker's `/location` resource.
pub struct BrokerClient {
    client: reqwest::Client,
    location_url: String,
}

impl BrokerClient {
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::TransportFailure(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            location_url: format!("{}/location", base_url.trim_end_matches('/')),
        })
    }

    pub fn location_url(&self) -> &str {
        &self.location_url
    }
}

impl SampleSource for BrokerClient {
    async fn latest(&self) -> SyncResult<Option<PositionSample>> {
        let response = self
            .client
            .get(&self.location_url)
            .send()
            .await
            .map_err(|e| SyncError::TransportFailure(format!("Failed to fetch location: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SyncError::TransportFailure(format!(
                "Failed to fetch location: HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::TransportFailure(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| SyncError::InvalidSample(e.to_string()))
    }
}

impl SampleSink for BrokerClient {
    async fn push(&self, sample: &PositionSample) -> SyncResult<()> {
        let response = self
            .client
            .post(&self.location_url)
            .json(sample)
            .send()
            .await
            .map_err(|e| SyncError::TransportFailure(format!("Failed to send location: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::TransportFailure(format!(
                "Failed to send location: HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
