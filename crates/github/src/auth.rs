//! GitHub App authentication.
//!
//! The App signs a short-lived RS256 assertion with its private key
//! (`iat` skewed 60s into the past to absorb clock drift, 600s lifetime) and
//! exchanges it for an installation-scoped access token. The private key is
//! read from the [`SecretSource`] on every exchange so rotations take effect
//! without a restart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::{AccessToken, AccessTokenProvider, ApiError, InstallationId, SecretName, SecretSource};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::response::{check, transport_error};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{ACCEPT, USER_AGENT};

/// Public GitHub REST endpoint.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Seconds `iat` is moved into the past.
pub const CLOCK_SKEW_SECS: i64 = 60;

/// Lifetime of the App assertion, measured from `iat`.
pub const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Bounded timeout of the token exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Claims of the App assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// The App id.
    pub iss: String,
}

impl AppClaims {
    /// Claims for an assertion created at `now` (epoch seconds).
    pub fn issued_at(app_id: u64, now: i64) -> Self {
        let iat = now - CLOCK_SKEW_SECS;
        Self { iat, exp: iat + ASSERTION_LIFETIME_SECS, iss: app_id.to_string() }
    }
}

/// Signs the App assertion with the PEM-encoded RSA private key.
pub fn sign_app_assertion(app_id: u64, private_key_pem: &str, now: i64) -> Result<String, ApiError> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| ApiError::Credential { message: format!("invalid App private key: {e}") })?;
    encode(&Header::new(Algorithm::RS256), &AppClaims::issued_at(app_id, now), &key)
        .map_err(|e| ApiError::Credential { message: format!("failed to sign App assertion: {e}") })
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

/// [`AccessTokenProvider`] backed by a GitHub App.
pub struct AppTokenProvider {
    http: reqwest::Client,
    api_base: String,
    app_id: u64,
    private_key: SecretName,
    secrets: Arc<dyn SecretSource>,
    retry: RetryConfig,
}

impl AppTokenProvider {
    /// Creates a provider for App `app_id` whose private key is stored under
    /// `private_key` in `secrets`.
    pub fn new(
        http: reqwest::Client,
        app_id: u64,
        private_key: SecretName,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            http,
            api_base: GITHUB_API_BASE.to_string(),
            app_id,
            private_key,
            secrets,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Points the provider at another API base (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the retry schedule.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn exchange(&self, installation: InstallationId, assertion: &str) -> Result<AccessToken, ApiError> {
        let url = format!("{}/app/installations/{}/access_tokens", self.api_base, installation);
        let response = self
            .http
            .post(&url)
            .bearer_auth(assertion)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(EXCHANGE_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check("installation_token", response).await?;
        let body: InstallationTokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse { message: e.to_string() })?;
        Ok(AccessToken::new(body.token))
    }
}

#[async_trait]
impl AccessTokenProvider for AppTokenProvider {
    #[instrument(skip(self), fields(app_id = self.app_id))]
    async fn installation_token(&self, installation: InstallationId) -> Result<AccessToken, ApiError> {
        let key = self.secrets.get_secret(&self.private_key).await?;
        let assertion = sign_app_assertion(self.app_id, key.expose(), Utc::now().timestamp())?;

        let token = retry_with_backoff(self.retry, "installation_token", || {
            self.exchange(installation, &assertion)
        })
        .await?;
        debug!(installation_id = %installation, "installation token acquired");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{SecretValue, StoreError};
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/app-key.pem");
    const PUBLIC_KEY: &str = include_str!("../tests/fixtures/app-key.pub.pem");

    struct FixedSecret(Option<&'static str>);

    #[async_trait]
    impl SecretSource for FixedSecret {
        async fn get_secret(&self, name: &SecretName) -> Result<SecretValue, StoreError> {
            self.0
                .map(SecretValue::new)
                .ok_or_else(|| StoreError::NotFound { key: name.to_string() })
        }
    }

    fn provider(server: &MockServer, secret: Option<&'static str>) -> AppTokenProvider {
        AppTokenProvider::new(
            reqwest::Client::new(),
            12345,
            SecretName::new("github-app-private-key").unwrap(),
            Arc::new(FixedSecret(secret)),
        )
        .with_api_base(server.uri())
        .with_retry(RetryConfig::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0))
    }

    #[test]
    fn claims_are_skewed_and_short_lived() {
        let claims = AppClaims::issued_at(12345, 1_700_000_000);
        assert_eq!(claims.iat, 1_700_000_000 - 60);
        assert_eq!(claims.exp, claims.iat + 600);
        assert_eq!(claims.iss, "12345");
    }

    #[test]
    fn assertion_is_rs256_signed() {
        let now = Utc::now().timestamp();
        let jwt = sign_app_assertion(12345, PRIVATE_KEY, now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&["12345"]);
        let decoded = decode::<AppClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims, AppClaims::issued_at(12345, now));
    }

    #[test]
    fn garbage_key_is_a_credential_error() {
        let err = sign_app_assertion(1, "not a key", 0).unwrap_err();
        assert!(matches!(err, ApiError::Credential { .. }));
    }

    #[tokio::test]
    async fn exchanges_assertion_for_installation_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/100/access_tokens"))
            .and(header("accept", ACCEPT))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_installation",
                "expires_at": "2030-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(&server, Some(PRIVATE_KEY))
            .installation_token(InstallationId::new(100))
            .await
            .unwrap();
        assert_eq!(token.expose(), "ghs_installation");
    }

    #[tokio::test]
    async fn missing_private_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

        let err = provider(&server, None).installation_token(InstallationId::new(100)).await.unwrap_err();
        assert!(matches!(err, ApiError::Credential { .. }));
    }

    #[tokio::test]
    async fn rejected_exchange_propagates_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server, Some(PRIVATE_KEY))
            .installation_token(InstallationId::new(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 401, .. }));
    }
}
