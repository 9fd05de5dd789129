//! OAuth access tokens for the Google APIs.
//!
//! On Cloud Run the metadata server hands out tokens for the service's own
//! identity. Tokens are cached until shortly before they expire.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::StoreError;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::http::{decode_error, failure, transport};

/// Metadata-server endpoint for the default service account's token.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for Google API calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a currently valid bearer token.
    async fn token(&self) -> Result<String, StoreError>;
}

/// A fixed token; for local development against emulators and for tests.
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    /// Wraps `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, StoreError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Tokens from the instance metadata server, cached.
pub struct MetadataTokenSource {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    /// Creates a source using the standard metadata endpoint.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_url(http, METADATA_TOKEN_URL)
    }

    /// Creates a source using another endpoint.
    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into(), cached: Mutex::new(None) }
    }

    async fn fetch(&self) -> Result<MetadataToken, StoreError> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| transport("metadata server", e))?;
        if !response.status().is_success() {
            return Err(failure("metadata server", "token", response).await);
        }
        response.json().await.map_err(|e| decode_error("metadata server", e))
    }
}

#[async_trait]
impl AccessTokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
        debug!(expires_in = fresh.expires_in, "access token refreshed");
        *cached = Some(CachedToken { value: fresh.access_token.clone(), refresh_at: Instant::now() + lifetime });
        Ok(fresh.access_token)
    }
}
