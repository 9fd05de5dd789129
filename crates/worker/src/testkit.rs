//! Recording fakes of the outbound collaborators and envelope builders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::{
    AccessToken, AccessTokenProvider, ApiError, AuthorKind, ChatId, ChatMessenger, ChatMetadata,
    CommentId, CommentPayload, DeliveryId, EventEnvelope, GitHubMetadata, InstallationId,
    IssueNumber, IssueTracker, LanguageModel, MessageId, MessagePayload, RepositoryName, Timestamp,
    UpdateId, UserLogin,
};
use gcp::InMemoryClaimCheckStore;

use crate::dispatcher::{Dispatcher, WorkerConfig};

pub const OWNER: &str = "octocat";
pub const REPOSITORY: &str = "octocat/hello-world";
pub const TRACKING_ISSUE: u64 = 24;
pub const CHAT_INSTALLATION: u64 = 200;
pub const GITHUB_INSTALLATION: u64 = 100;
pub const ANSWER: &str = "Here is a concise answer.";

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        tracking_repository: RepositoryName::new(REPOSITORY).unwrap(),
        tracking_issue: IssueNumber::new(TRACKING_ISSUE),
        chat_installation: InstallationId::new(CHAT_INSTALLATION),
    }
}

fn github_envelope(author: &str, kind: AuthorKind, body: &str, issue: u64) -> EventEnvelope {
    let metadata = GitHubMetadata {
        installation_id: Some(InstallationId::new(GITHUB_INSTALLATION)),
        repository: RepositoryName::new(REPOSITORY).unwrap(),
        repository_owner: UserLogin::new(OWNER).unwrap(),
        issue_number: IssueNumber::new(issue),
        comment_id: CommentId::new(555),
        author: UserLogin::new(author).unwrap(),
        author_kind: kind,
    };
    let payload = CommentPayload { body: body.to_string(), issue_title: "Tracking".to_string(), issue_labels: vec![] };
    EventEnvelope::github(DeliveryId::new("d-1").unwrap(), Timestamp::now(), metadata, payload)
}

/// A human comment on the tracking issue.
pub fn comment_envelope(author: &str, body: &str) -> EventEnvelope {
    github_envelope(author, AuthorKind::User, body, TRACKING_ISSUE)
}

/// A human comment on some other issue.
pub fn comment_elsewhere(author: &str, body: &str) -> EventEnvelope {
    github_envelope(author, AuthorKind::User, body, 7)
}

/// A bot-authored comment on the tracking issue.
pub fn bot_comment_envelope(body: &str) -> EventEnvelope {
    github_envelope("airlock-app[bot]", AuthorKind::Bot, body, TRACKING_ISSUE)
}

/// A chat message from alice in chat 777.
pub fn chat_envelope(text: &str) -> EventEnvelope {
    let metadata = ChatMetadata {
        update_id: UpdateId::new(42),
        chat_id: ChatId::new(777),
        user_id: None,
        username: Some("alice".to_string()),
        first_name: Some("Alice".to_string()),
        sender_is_bot: false,
    };
    let payload = MessagePayload { text: text.to_string(), message_id: Some(MessageId::new(9)) };
    EventEnvelope::telegram(DeliveryId::new("42").unwrap(), Timestamp::now(), metadata, payload)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Token(u64),
    Comment { repository: String, issue: u64, body: String },
    AddLabels { issue: u64, labels: Vec<String> },
    AddAssignees { issue: u64, assignees: Vec<String> },
    Complete { prompt: String },
    SendMessage { chat: i64, text: String },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::AddLabels { .. } | Call::AddAssignees { .. })
    }
}

/// Which collaborator calls fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub token: bool,
    pub mutation: bool,
    pub model: bool,
    pub chat: bool,
    /// Fails comments whose body contains this text.
    pub comment_containing: Option<&'static str>,
}

pub struct FakeWorld {
    calls: Mutex<Vec<Call>>,
    failures: Failures,
    next_comment: AtomicU64,
    pub claim_checks: Arc<InMemoryClaimCheckStore>,
}

fn unavailable() -> ApiError {
    ApiError::Status { status: 502, message: "bad gateway".to_string() }
}

impl FakeWorld {
    pub fn new() -> Arc<Self> {
        Self::failing(Failures::default())
    }

    pub fn failing(failures: Failures) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures,
            next_comment: AtomicU64::new(1000),
            claim_checks: Arc::new(InMemoryClaimCheckStore::new()),
        })
    }

    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        Dispatcher::new(
            worker_config(),
            self.claim_checks.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Comment { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AccessTokenProvider for FakeWorld {
    async fn installation_token(&self, installation: InstallationId) -> Result<AccessToken, ApiError> {
        self.record(Call::Token(installation.as_u64()));
        if self.failures.token {
            return Err(ApiError::Credential { message: "private key unavailable".to_string() });
        }
        Ok(AccessToken::new("ghs_test"))
    }
}

#[async_trait]
impl IssueTracker for FakeWorld {
    async fn post_comment(
        &self,
        _token: &AccessToken,
        repository: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentId, ApiError> {
        self.record(Call::Comment {
            repository: repository.to_string(),
            issue: issue.as_u64(),
            body: body.to_string(),
        });
        if self.failures.comment_containing.is_some_and(|needle| body.contains(needle)) {
            return Err(unavailable());
        }
        Ok(CommentId::new(self.next_comment.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn add_labels(
        &self,
        _token: &AccessToken,
        _repository: &RepositoryName,
        issue: IssueNumber,
        labels: &[String],
    ) -> Result<(), ApiError> {
        self.record(Call::AddLabels { issue: issue.as_u64(), labels: labels.to_vec() });
        if self.failures.mutation {
            return Err(unavailable());
        }
        Ok(())
    }

    async fn add_assignees(
        &self,
        _token: &AccessToken,
        _repository: &RepositoryName,
        issue: IssueNumber,
        assignees: &[String],
    ) -> Result<(), ApiError> {
        self.record(Call::AddAssignees { issue: issue.as_u64(), assignees: assignees.to_vec() });
        if self.failures.mutation {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl ChatMessenger for FakeWorld {
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<MessageId, ApiError> {
        self.record(Call::SendMessage { chat: chat.as_i64(), text: text.to_string() });
        if self.failures.chat {
            return Err(ApiError::Timeout);
        }
        Ok(MessageId::new(31))
    }
}

#[async_trait]
impl LanguageModel for FakeWorld {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        self.record(Call::Complete { prompt: prompt.to_string() });
        if self.failures.model {
            return Err(ApiError::RateLimited { status: 429, retry_after: None });
        }
        Ok(ANSWER.to_string())
    }
}
