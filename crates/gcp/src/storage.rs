//! Cloud Storage claim-check store.
//!
//! Objects are written with a simple media upload and read back with
//! `alt=media`. Keys contain `/`, so they are percent-encoded as a single
//! path segment on read.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ClaimCheckKey, ClaimCheckStore, StoreError};
use reqwest::Url;
use tracing::{debug, instrument};

use crate::auth::AccessTokenSource;
use crate::http::{decode_error, failure, transport, CALL_TIMEOUT};

/// Public Cloud Storage JSON API endpoint.
pub const STORAGE_API_BASE: &str = "https://storage.googleapis.com";

/// [`ClaimCheckStore`] over a Cloud Storage bucket.
pub struct GcsClaimCheckStore {
    http: reqwest::Client,
    api_base: String,
    bucket: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GcsClaimCheckStore {
    /// Creates a store writing objects into `bucket`.
    pub fn new(http: reqwest::Client, bucket: impl Into<String>, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self { http, api_base: STORAGE_API_BASE.to_string(), bucket: bucket.into(), tokens }
    }

    /// Points the store at another API base (emulator, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| StoreError::unavailable(format!("invalid storage URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::unavailable("storage URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ClaimCheckStore for GcsClaimCheckStore {
    #[instrument(skip(self, bytes), fields(key = %key, size = bytes.len()))]
    async fn put(&self, key: &ClaimCheckKey, bytes: Vec<u8>) -> Result<(), StoreError> {
        let token = self.tokens.token().await?;
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut().append_pair("uploadType", "media").append_pair("name", key.as_str());

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(CALL_TIMEOUT)
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport("cloud storage", e))?;
        if !response.status().is_success() {
            return Err(failure("cloud storage", key.as_str(), response).await);
        }
        debug!("claim-check object written");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &ClaimCheckKey) -> Result<Vec<u8>, StoreError> {
        let token = self.tokens.token().await?;
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o", key.as_str()])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport("cloud storage", e))?;
        if !response.status().is_success() {
            return Err(failure("cloud storage", key.as_str(), response).await);
        }
        let bytes = response.bytes().await.map_err(|e| decode_error("cloud storage", e))?;
        Ok(bytes.to_vec())
    }
}
