//! HTTP client for the video provider API.
//!
//! # Responsibilities
//! - Query asset status and submit new assets
//! - Map transport failures and HTTP statuses onto `ProviderError`
//!
//! Resilience (breaker, retries, timeouts) is applied by the caller through
//! `ResilienceContext`; this client makes exactly one request per call.

use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::types::{AssetEnvelope, AssetStatus, CreateAssetRequest};
use crate::provider::JobStatusSource;

/// Thin `reqwest` wrapper around the provider's asset endpoints.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: Url,
    token_id: String,
    token_secret: String,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url: Url = config.base_url.parse().map_err(|e| {
            ProviderError::decode(format!("Invalid provider URL '{}': {}", config.base_url, e))
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(concat!("video-resilience/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token_id: config.token_id.clone(),
            token_secret: config.token_secret.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /video/v1/assets/{id}`.
    pub async fn asset_status(&self, asset_id: &str) -> Result<AssetStatus, ProviderError> {
        let url = self.endpoint(&format!("video/v1/assets/{}", asset_id))?;
        let response = self
            .http
            .get(url)
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await
            .map_err(map_send_error)?;

        decode_asset(response).await
    }

    /// `POST /video/v1/assets`. Returns the new asset in its initial state.
    pub async fn create_asset(&self, input_url: &str) -> Result<AssetStatus, ProviderError> {
        let url = self.endpoint("video/v1/assets")?;
        let response = self
            .http
            .post(url)
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .json(&CreateAssetRequest {
                input: input_url,
                playback_policy: ["public"],
            })
            .send()
            .await
            .map_err(map_send_error)?;

        decode_asset(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::decode(format!("Invalid endpoint path '{}': {}", path, e)))
    }
}

impl JobStatusSource for ProviderClient {
    fn check_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<AssetStatus, ProviderError>> + Send {
        let job_id = job_id.to_string();
        async move { self.asset_status(&job_id).await }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("base_url", &self.base_url.as_str())
            .field("token_id", &self.token_id)
            .finish()
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError {
            kind: ProviderErrorKind::Timeout,
            message: format!("Provider request timed out: {}", e),
        }
    } else {
        ProviderError::transport(format!("Provider request failed: {}", e))
    }
}

async fn decode_asset(response: reqwest::Response) -> Result<AssetStatus, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::status(
            status.as_u16(),
            format!("Provider returned {}: {}", status, body.trim()),
        ));
    }

    let envelope: AssetEnvelope = response
        .json()
        .await
        .map_err(|e| ProviderError::decode(format!("Unreadable provider response: {}", e)))?;
    Ok(envelope.data.into())
}
