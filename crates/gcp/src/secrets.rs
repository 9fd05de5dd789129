//! Secret sources: Secret Manager and the process environment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use domain::{SecretName, SecretSource, SecretValue, StoreError};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::AccessTokenSource;
use crate::http::{decode_error, failure, transport, CALL_TIMEOUT};

/// Public Secret Manager endpoint.
pub const SECRET_MANAGER_API_BASE: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// [`SecretSource`] reading the `latest` version from Secret Manager.
pub struct SecretManagerSource {
    http: reqwest::Client,
    api_base: String,
    project: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SecretManagerSource {
    /// Creates a source for secrets in `project`.
    pub fn new(http: reqwest::Client, project: impl Into<String>, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self { http, api_base: SECRET_MANAGER_API_BASE.to_string(), project: project.into(), tokens }
    }

    /// Points the source at another API base (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SecretSource for SecretManagerSource {
    #[instrument(skip(self), fields(secret = %name))]
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, StoreError> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.api_base, self.project, name
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport("secret manager", e))?;
        if !response.status().is_success() {
            return Err(failure("secret manager", name.as_str(), response).await);
        }

        let access: AccessResponse = response.json().await.map_err(|e| decode_error("secret manager", e))?;
        let bytes = STANDARD
            .decode(access.payload.data)
            .map_err(|e| StoreError::Corrupt { message: format!("secret payload is not base64: {e}") })?;
        let value = String::from_utf8(bytes)
            .map_err(|_| StoreError::Corrupt { message: "secret payload is not UTF-8".to_string() })?;
        Ok(SecretValue::new(value.trim_end().to_string()))
    }
}

/// [`SecretSource`] backed by environment variables.
///
/// A secret named `telegram-bot-token` is read from `TELEGRAM_BOT_TOKEN`.
/// The environment is captured once, at construction.
pub struct EnvSecretSource {
    vars: HashMap<String, String>,
}

impl EnvSecretSource {
    /// Captures the current process environment.
    pub fn from_env() -> Self {
        Self { vars: std::env::vars().collect() }
    }

    /// Uses the given variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Environment variable consulted for `name`.
    pub fn variable_for(name: &SecretName) -> String {
        name.as_str().to_ascii_uppercase().replace('-', "_")
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, StoreError> {
        let variable = Self::variable_for(name);
        self.vars
            .get(&variable)
            .filter(|value| !value.is_empty())
            .map(SecretValue::new)
            .ok_or(StoreError::NotFound { key: variable })
    }
}
