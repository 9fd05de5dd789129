//! Firestore-backed idempotency ledger.
//!
//! `createDocument` with an explicit `documentId` is atomic: Firestore answers
//! `409 ALREADY_EXISTS` to every caller but the first. Expired documents are
//! removed by a TTL policy on the `expire_at` field, configured on the
//! collection; this adapter never deletes.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{CreateOutcome, IdempotencyLedger, IdempotencyRecord, StoreError};
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::auth::AccessTokenSource;
use crate::http::{failure, transport, CALL_TIMEOUT};

/// Public Firestore REST endpoint.
pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Default collection holding delivery records.
pub const DEFAULT_COLLECTION: &str = "webhook_deliveries";

/// [`IdempotencyLedger`] over Firestore.
pub struct FirestoreLedger {
    http: reqwest::Client,
    api_base: String,
    project: String,
    collection: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl FirestoreLedger {
    /// Creates a ledger writing to `collection` in `project`'s default database.
    pub fn new(
        http: reqwest::Client,
        project: impl Into<String>,
        collection: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            api_base: FIRESTORE_API_BASE.to_string(),
            project: project.into(),
            collection: collection.into(),
            tokens,
        }
    }

    /// Points the ledger at another API base (emulator, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn create_url(&self, document_id: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.api_base, self.project, self.collection
        ))
        .map_err(|e| StoreError::unavailable(format!("invalid Firestore URL: {e}")))?;
        url.query_pairs_mut().append_pair("documentId", document_id);
        Ok(url)
    }
}

/// Firestore document body for a record.
fn document(record: &IdempotencyRecord) -> Value {
    json!({
        "fields": {
            "timestamp": { "timestampValue": record.timestamp.to_string() },
            "status": { "stringValue": record.status.as_str() },
            "source": { "stringValue": record.source.as_str() },
            "expire_at": { "timestampValue": record.expire_at.to_string() },
        }
    })
}

#[async_trait]
impl IdempotencyLedger for FirestoreLedger {
    #[instrument(skip(self, record), fields(key = %record.key))]
    async fn create(&self, record: &IdempotencyRecord) -> Result<CreateOutcome, StoreError> {
        let token = self.tokens.token().await?;
        let url = self.create_url(record.key.as_str())?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .timeout(CALL_TIMEOUT)
            .json(&document(record))
            .send()
            .await
            .map_err(|e| transport("firestore", e))?;

        match response.status() {
            status if status.is_success() => {
                debug!("idempotency record created");
                Ok(CreateOutcome::Created)
            }
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            _ => Err(failure("firestore", record.key.as_str(), response).await),
        }
    }
}
