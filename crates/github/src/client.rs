//! Issue-tracker REST client: comments, labels, assignees.

use std::time::Duration;

use async_trait::async_trait;
use domain::{AccessToken, ApiError, CommentId, IssueNumber, IssueTracker, RepositoryName};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::auth::GITHUB_API_BASE;
use crate::response::{check, transport_error};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{ACCEPT, USER_AGENT};

/// Bounded timeout for each issue-tracker call.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct CommentResponse {
    id: u64,
}

#[derive(Serialize)]
struct LabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Serialize)]
struct AssigneesRequest<'a> {
    assignees: &'a [String],
}

/// [`IssueTracker`] over the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryConfig,
}

impl GitHubClient {
    /// Creates a client against the public API.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, api_base: GITHUB_API_BASE.to_string(), retry: RetryConfig::DEFAULT }
    }

    /// Points the client at another API base (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the retry schedule.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn issue_url(&self, repository: &RepositoryName, issue: IssueNumber, tail: &str) -> String {
        format!("{}/repos/{}/issues/{}/{}", self.api_base, repository, issue, tail)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        token: &AccessToken,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        retry_with_backoff(self.retry, operation, || async {
            let response = self
                .http
                .post(url)
                .bearer_auth(token.expose())
                .header(reqwest::header::ACCEPT, ACCEPT)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .timeout(CALL_TIMEOUT)
                .json(body)
                .send()
                .await
                .map_err(transport_error)?;
            check(operation, response).await
        })
        .await
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    #[instrument(skip(self, token, body), fields(repository = %repository, issue = %issue))]
    async fn post_comment(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentId, ApiError> {
        let url = self.issue_url(repository, issue, "comments");
        let response = self.post_json("post_comment", token, &url, &CommentRequest { body }).await?;
        let created: CommentResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse { message: e.to_string() })?;
        debug!(comment_id = created.id, "comment posted");
        Ok(CommentId::new(created.id))
    }

    #[instrument(skip(self, token), fields(repository = %repository, issue = %issue))]
    async fn add_labels(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        labels: &[String],
    ) -> Result<(), ApiError> {
        let url = self.issue_url(repository, issue, "labels");
        self.post_json("add_labels", token, &url, &LabelsRequest { labels }).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(repository = %repository, issue = %issue))]
    async fn add_assignees(
        &self,
        token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        assignees: &[String],
    ) -> Result<(), ApiError> {
        let url = self.issue_url(repository, issue, "assignees");
        self.post_json("add_assignees", token, &url, &AssigneesRequest { assignees }).await?;
        Ok(())
    }
}
