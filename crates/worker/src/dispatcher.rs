//! Per-task pipeline.
//!
//! ```text
//! resolve payload -> re-screen -> route by source
//!   git-host, command  : token -> authorize -> (mutate) -> confirmation comment
//!   git-host, comment  : scope check -> token -> conversation
//!   chat, message      : token -> conversation -> chat reply
//! conversation: intake comment (best effort) -> model -> response comment
//! ```
//!
//! Failures that the queue should retry are returned as [`DispatchError`].
//! A task redelivered after a partial run repeats every side effect that had
//! already happened; outbound comments and chat messages carry no
//! idempotency keys, so users can see duplicates under at-least-once delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{
    authorize, parse_command, screen, AccessToken, AccessTokenProvider, ApiError, Authorization,
    ChatMessenger, ChatMetadata, ClaimCheckKey, ClaimCheckStore, Command, CommandAction,
    CommentId, ErrorCategory, EventEnvelope, EventMetadata, FilterReason, GitHubMetadata,
    InstallationId, IssueNumber, IssueTracker, LanguageModel, MessageId, RepositoryName,
    StoreError, TaskPayload, TaskRunId,
};
use serde::Serialize;
use thiserror::Error;
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::messages;
use crate::steps::best_effort;

// ---------------------------------------------------------------------------
// Configuration and outcomes
// ---------------------------------------------------------------------------

/// Where conversations are recorded.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Repository holding the tracking issue.
    pub tracking_repository: RepositoryName,
    /// The tracking issue.
    pub tracking_issue: IssueNumber,
    /// Installation whose token is used for chat-originated events.
    pub chat_installation: InstallationId,
}

/// Ids of the messages a task produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProducedMessages {
    /// Comments posted on the issue tracker, in order.
    pub comment_ids: Vec<CommentId>,
    /// Messages sent to the chat platform.
    pub chat_message_ids: Vec<MessageId>,
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The mutating call succeeded.
    Applied,
    /// Not the repository owner; nothing was mutated.
    Unauthorized,
    /// Recognized verb without arguments.
    Usage,
    /// Unrecognized verb.
    Unknown,
    /// The mutating call failed; the user was told.
    Failed(ErrorCategory),
}

impl CommandStatus {
    /// Stable name.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Applied => "applied",
            CommandStatus::Unauthorized => "unauthorized",
            CommandStatus::Usage => "usage",
            CommandStatus::Unknown => "unknown",
            CommandStatus::Failed(_) => "failed",
        }
    }
}

/// Successful end of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Dropped by a guard; no outbound call was made.
    Dropped {
        /// Why.
        reason: FilterReason,
    },
    /// A slash-command was handled.
    Command {
        /// Verb as typed.
        verb: String,
        /// Result of the command.
        status: CommandStatus,
        /// Comments posted.
        messages: ProducedMessages,
    },
    /// The model was consulted and its answer recorded.
    Conversation {
        /// Comments and chat messages posted.
        messages: ProducedMessages,
    },
}

impl DispatchOutcome {
    /// Messages produced, if any.
    pub fn messages(&self) -> Option<&ProducedMessages> {
        match self {
            DispatchOutcome::Dropped { .. } => None,
            DispatchOutcome::Command { messages, .. } | DispatchOutcome::Conversation { messages } => Some(messages),
        }
    }
}

/// A task failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The claim-check blob could not be read.
    #[error("claim-check {locator} could not be read: {source}")]
    ClaimCheck {
        /// Locator from the task.
        locator: ClaimCheckKey,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The claim-check blob is not the envelope the task refers to.
    #[error("claim-check {locator} holds an unusable envelope: {message}")]
    CorruptEnvelope {
        /// Locator from the task.
        locator: ClaimCheckKey,
        /// Diagnostic.
        message: String,
    },

    /// A git-host event without an installation id.
    #[error("event carries no installation id")]
    MissingInstallation,

    /// The installation token could not be obtained.
    #[error("installation token unavailable: {0}")]
    Credential(#[source] ApiError),

    /// The language model call failed.
    #[error("language model call failed: {0}")]
    Model(#[source] ApiError),

    /// A comment the task cannot complete without failed to post.
    #[error("posting the {step} failed: {source}")]
    Post {
        /// Which comment.
        step: &'static str,
        /// API failure.
        #[source]
        source: ApiError,
    },
}

impl DispatchError {
    /// Error category. Only dependency failures are worth a retry.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DispatchError::CorruptEnvelope { .. } | DispatchError::MissingInstallation => {
                ErrorCategory::MalformedInput
            }
            DispatchError::ClaimCheck { source: StoreError::Corrupt { .. }, .. } => ErrorCategory::MalformedInput,
            DispatchError::ClaimCheck { .. }
            | DispatchError::Credential(_)
            | DispatchError::Model(_)
            | DispatchError::Post { .. } => ErrorCategory::DependencyFailure,
        }
    }

    /// Whether the queue should redeliver the task.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::DependencyFailure
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs queued tasks against the collaborators.
pub struct Dispatcher {
    config: WorkerConfig,
    claim_checks: Arc<dyn ClaimCheckStore>,
    tokens: Arc<dyn AccessTokenProvider>,
    issues: Arc<dyn IssueTracker>,
    chat: Arc<dyn ChatMessenger>,
    model: Arc<dyn LanguageModel>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(
        config: WorkerConfig,
        claim_checks: Arc<dyn ClaimCheckStore>,
        tokens: Arc<dyn AccessTokenProvider>,
        issues: Arc<dyn IssueTracker>,
        chat: Arc<dyn ChatMessenger>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self { config, claim_checks, tokens, issues, chat, model }
    }

    /// Runs one task execution. `run_id` distinguishes redeliveries.
    pub async fn dispatch(&self, run_id: TaskRunId, payload: TaskPayload) -> Result<DispatchOutcome, DispatchError> {
        let span = info_span!(
            "worker.task",
            run_id = %run_id,
            correlation_id = %payload.correlation_id(),
            mode = payload.mode().as_str(),
            source = Empty
        );
        async move {
            let started = Instant::now();
            let result = self.run(payload, started).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(outcome) => info!(elapsed_ms, outcome = outcome_name(outcome), "task finished"),
                Err(err) => error!(elapsed_ms, category = %err.category(), error = %err, "task failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, payload: TaskPayload, started: Instant) -> Result<DispatchOutcome, DispatchError> {
        let envelope = self.resolve(payload).await?;
        Span::current().record("source", envelope.source().as_str());

        if let Some(reason) = screen(&envelope) {
            info!(reason = %reason, "task dropped by guard");
            return Ok(DispatchOutcome::Dropped { reason });
        }

        match envelope.metadata() {
            EventMetadata::GitHub(meta) => self.github(&envelope, meta, started).await,
            EventMetadata::Telegram(meta) => self.telegram(&envelope, meta, started).await,
        }
    }

    async fn resolve(&self, payload: TaskPayload) -> Result<EventEnvelope, DispatchError> {
        match payload {
            TaskPayload::Inline { envelope, .. } => Ok(envelope),
            TaskPayload::ClaimCheck { correlation_id, locator, .. } => {
                let bytes = self
                    .claim_checks
                    .get(&locator)
                    .await
                    .map_err(|source| DispatchError::ClaimCheck { locator: locator.clone(), source })?;
                debug!(size = bytes.len(), locator = %locator, "claim-check resolved");

                let envelope: EventEnvelope = serde_json::from_slice(&bytes).map_err(|e| {
                    DispatchError::CorruptEnvelope { locator: locator.clone(), message: e.to_string() }
                })?;
                if envelope.correlation_id() != &correlation_id {
                    return Err(DispatchError::CorruptEnvelope {
                        locator,
                        message: format!("envelope belongs to {}", envelope.correlation_id()),
                    });
                }
                Ok(envelope)
            }
        }
    }

    async fn token(&self, installation: InstallationId) -> Result<AccessToken, DispatchError> {
        self.tokens.installation_token(installation).await.map_err(DispatchError::Credential)
    }

    fn on_tracking_issue(&self, meta: &GitHubMetadata) -> bool {
        meta.issue_number == self.config.tracking_issue
            && meta.repository.as_str().eq_ignore_ascii_case(self.config.tracking_repository.as_str())
    }

    async fn github(
        &self,
        envelope: &EventEnvelope,
        meta: &GitHubMetadata,
        started: Instant,
    ) -> Result<DispatchOutcome, DispatchError> {
        let command = parse_command(envelope.text());
        if command.is_none() && !self.on_tracking_issue(meta) {
            info!(repository = %meta.repository, issue = %meta.issue_number, "comment outside tracking issue dropped");
            return Ok(DispatchOutcome::Dropped { reason: FilterReason::OutsideTrackingScope });
        }

        let installation = meta.installation_id.ok_or(DispatchError::MissingInstallation)?;
        let token = self.token(installation).await?;

        match command {
            Some(command) => self.command(&token, meta, command).await,
            None => {
                let conversation = self
                    .converse(&token, envelope, &meta.repository, meta.issue_number, started)
                    .await?;
                Ok(DispatchOutcome::Conversation { messages: conversation.produced })
            }
        }
    }

    async fn telegram(
        &self,
        envelope: &EventEnvelope,
        meta: &ChatMetadata,
        started: Instant,
    ) -> Result<DispatchOutcome, DispatchError> {
        let token = self.token(self.config.chat_installation).await?;
        let repository = &self.config.tracking_repository;
        let issue = self.config.tracking_issue;

        let Conversation { mut produced, answer } =
            self.converse(&token, envelope, repository, issue, started).await?;
        if !envelope.source().supports_direct_reply() {
            return Ok(DispatchOutcome::Conversation { messages: produced });
        }
        // The answer is already on the tracking issue; the chat reply may fail
        // without failing the task.
        match self.chat.send_message(meta.chat_id, &answer).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "chat reply sent");
                produced.chat_message_ids.push(message_id);
            }
            Err(err) => {
                warn!(error = %err, "chat reply failed");
                let notice = messages::reply_failed(envelope, ErrorCategory::DependencyFailure);
                let posted = best_effort(
                    "reply failure comment",
                    self.issues.post_comment(&token, repository, issue, &notice),
                )
                .await;
                produced.comment_ids.extend(posted);
            }
        }
        Ok(DispatchOutcome::Conversation { messages: produced })
    }

    async fn converse(
        &self,
        token: &AccessToken,
        envelope: &EventEnvelope,
        repository: &RepositoryName,
        issue: IssueNumber,
        started: Instant,
    ) -> Result<Conversation, DispatchError> {
        let mut produced = ProducedMessages::default();

        let intake = best_effort(
            "intake comment",
            self.issues.post_comment(token, repository, issue, &messages::intake(envelope)),
        )
        .await;
        produced.comment_ids.extend(intake);

        let answer = self.model.complete(&messages::prompt(envelope)).await.map_err(DispatchError::Model)?;
        let latency: Duration = started.elapsed();
        debug!(answer_len = answer.len(), latency_ms = latency.as_millis() as u64, "model answered");

        let body = messages::response(envelope, &answer, latency);
        let comment = self
            .issues
            .post_comment(token, repository, issue, &body)
            .await
            .map_err(|source| DispatchError::Post { step: "response comment", source })?;
        info!(comment_id = %comment, "response posted");
        produced.comment_ids.push(comment);

        Ok(Conversation { produced, answer })
    }

    async fn command(
        &self,
        token: &AccessToken,
        meta: &GitHubMetadata,
        command: Command,
    ) -> Result<DispatchOutcome, DispatchError> {
        let verb = command.verb.clone();
        let (status, reply) = match authorize(&meta.author, &meta.repository_owner) {
            Authorization::Unauthorized => {
                warn!(verb = %verb, author = %meta.author, "command from non-owner rejected");
                (CommandStatus::Unauthorized, messages::unauthorized(&verb, &meta.author))
            }
            Authorization::Authorized => self.execute(token, meta, &verb, command.action()).await,
        };

        let comment = self
            .issues
            .post_comment(token, &meta.repository, meta.issue_number, &reply)
            .await
            .map_err(|source| DispatchError::Post { step: "command reply", source })?;
        info!(verb = %verb, status = status.as_str(), comment_id = %comment, "command handled");

        Ok(DispatchOutcome::Command {
            verb,
            status,
            messages: ProducedMessages { comment_ids: vec![comment], chat_message_ids: Vec::new() },
        })
    }

    async fn execute(
        &self,
        token: &AccessToken,
        meta: &GitHubMetadata,
        verb: &str,
        action: CommandAction,
    ) -> (CommandStatus, String) {
        let (repository, issue) = (&meta.repository, meta.issue_number);
        match action {
            CommandAction::AddLabels(labels) => {
                let result = self.issues.add_labels(token, repository, issue, &labels).await;
                settle(verb, result, messages::labels_added(&labels))
            }
            CommandAction::AddAssignees(users) => {
                let result = self.issues.add_assignees(token, repository, issue, &users).await;
                settle(verb, result, messages::assignees_added(&users))
            }
            CommandAction::Usage { verb, usage } => (CommandStatus::Usage, messages::usage(&verb, usage)),
            CommandAction::Unknown { verb } => (CommandStatus::Unknown, messages::unknown_command(&verb)),
        }
    }
}

fn settle(verb: &str, result: Result<(), ApiError>, confirmation: String) -> (CommandStatus, String) {
    match result {
        Ok(()) => (CommandStatus::Applied, confirmation),
        Err(err) => {
            error!(verb, error = %err, "command mutation failed");
            let category = ErrorCategory::DependencyFailure;
            (CommandStatus::Failed(category), messages::command_failed(verb, category))
        }
    }
}

struct Conversation {
    produced: ProducedMessages,
    answer: String,
}

fn outcome_name(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::Dropped { .. } => "dropped",
        DispatchOutcome::Command { .. } => "command",
        DispatchOutcome::Conversation { .. } => "conversation",
    }
}
