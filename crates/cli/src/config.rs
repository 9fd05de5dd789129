//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its environment variable.
//! Clap rejects missing required options; [`GatewayArgs::validate`] and
//! [`WorkerArgs::validate`] reject values that parse but cannot work. Both
//! run before any socket is bound.

use clap::{Args, Parser, Subcommand, ValueEnum};
use domain::{InstallationId, IssueNumber, RepositoryName, SecretName, DEFAULT_CLAIM_CHECK_THRESHOLD};
use thiserror::Error;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "airlock", version, about = "Webhook airlock gateway and worker")]
pub struct Cli {
    /// Service to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The two services.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify, deduplicate and enqueue webhook deliveries.
    Gateway(GatewayArgs),
    /// Process queued tasks.
    Worker(WorkerArgs),
}

impl Command {
    /// Name reported in telemetry.
    pub fn service_name(&self) -> &'static str {
        match self {
            Command::Gateway(_) => "airlock",
            Command::Worker(_) => "worker",
        }
    }
}

/// Where the gateway keeps its ledger, blobs and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Firestore, Cloud Storage and Cloud Tasks.
    Gcp,
    /// In-process maps for local development only; tasks are recorded, not
    /// delivered, and state is lost on restart.
    Memory,
}

/// Where the worker reads credential material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretBackend {
    /// Secret Manager, latest version.
    SecretManager,
    /// Environment variables named after the secret.
    Env,
}

/// A value that parsed but is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required when the selected backend needs it.
    #[error("{option} is required")]
    Missing {
        /// Environment variable name.
        option: &'static str,
    },

    /// Present but invalid.
    #[error("{option} is invalid: {reason}")]
    Invalid {
        /// Environment variable name.
        option: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

fn non_empty(option: &'static str, value: Option<&str>) -> Result<String, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing { option }),
    }
}

fn secret_name(option: &'static str, value: &str) -> Result<SecretName, ConfigError> {
    SecretName::new(value.trim()).ok_or(ConfigError::Missing { option })
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// `airlock gateway` options.
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// HMAC secret shared with the git host.
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Token shared with the chat platform. Absent: chat updates are admitted unauthenticated.
    #[arg(long, env = "TELEGRAM_WEBHOOK_SECRET", hide_env_values = true)]
    pub telegram_webhook_secret: Option<String>,

    /// Storage backend. `memory` is for local development only.
    #[arg(long, env = "AIRLOCK_BACKEND", value_enum, default_value_t = Backend::Gcp)]
    pub backend: Backend,

    /// Worker endpoint tasks are delivered to.
    #[arg(long, env = "WORKER_URL")]
    pub worker_url: Option<String>,

    /// Cloud project.
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project: Option<String>,

    /// Queue region.
    #[arg(long, env = "QUEUE_LOCATION", default_value = "us-central1")]
    pub queue_location: String,

    /// Queue name.
    #[arg(long, env = "QUEUE_NAME", default_value = "issue-commands-queue")]
    pub queue_name: String,

    /// Service account the queue mints OIDC tokens for.
    #[arg(long, env = "TASK_INVOKER_SERVICE_ACCOUNT")]
    pub task_invoker_service_account: Option<String>,

    /// Bucket for oversized envelopes.
    #[arg(long, env = "CLAIM_CHECK_BUCKET")]
    pub claim_check_bucket: Option<String>,

    /// Largest envelope, in bytes, that travels inline.
    #[arg(long, env = "CLAIM_CHECK_THRESHOLD", default_value_t = DEFAULT_CLAIM_CHECK_THRESHOLD)]
    pub claim_check_threshold: usize,

    /// Firestore collection of the idempotency ledger.
    #[arg(long, env = "LEDGER_COLLECTION", default_value = gcp::firestore::DEFAULT_COLLECTION)]
    pub ledger_collection: String,
}

/// Validated gateway settings.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub port: u16,
    pub webhook_secret: String,
    pub telegram_webhook_secret: Option<String>,
    pub claim_check_threshold: usize,
    pub storage: GatewayStorage,
}

/// Validated backend selection.
#[derive(Debug, Clone)]
pub enum GatewayStorage {
    Memory,
    Gcp {
        project: String,
        bucket: String,
        ledger_collection: String,
        queue_location: String,
        queue_name: String,
        worker_url: String,
        invoker_service_account: Option<String>,
    },
}

impl GatewayArgs {
    /// Checks values clap cannot.
    pub fn validate(self) -> Result<GatewaySettings, ConfigError> {
        let webhook_secret = non_empty("WEBHOOK_SECRET", Some(&self.webhook_secret))?;
        let telegram_webhook_secret = self
            .telegram_webhook_secret
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if self.claim_check_threshold == 0 {
            return Err(ConfigError::Invalid { option: "CLAIM_CHECK_THRESHOLD", reason: "must be positive" });
        }

        let storage = match self.backend {
            Backend::Memory => GatewayStorage::Memory,
            Backend::Gcp => {
                let worker_url = non_empty("WORKER_URL", self.worker_url.as_deref())?;
                if !(worker_url.starts_with("https://") || worker_url.starts_with("http://")) {
                    return Err(ConfigError::Invalid { option: "WORKER_URL", reason: "must be an http(s) URL" });
                }
                GatewayStorage::Gcp {
                    project: non_empty("GCP_PROJECT_ID", self.project.as_deref())?,
                    bucket: non_empty("CLAIM_CHECK_BUCKET", self.claim_check_bucket.as_deref())?,
                    ledger_collection: non_empty("LEDGER_COLLECTION", Some(&self.ledger_collection))?,
                    queue_location: non_empty("QUEUE_LOCATION", Some(&self.queue_location))?,
                    queue_name: non_empty("QUEUE_NAME", Some(&self.queue_name))?,
                    worker_url,
                    invoker_service_account: self
                        .task_invoker_service_account
                        .filter(|s| !s.trim().is_empty()),
                }
            }
        };

        Ok(GatewaySettings {
            port: self.port,
            webhook_secret,
            telegram_webhook_secret,
            claim_check_threshold: self.claim_check_threshold,
            storage,
        })
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// `airlock worker` options.
#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    /// Cloud project.
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project: String,

    /// Bucket holding claim-checked envelopes.
    #[arg(long, env = "CLAIM_CHECK_BUCKET")]
    pub claim_check_bucket: String,

    /// GitHub App id.
    #[arg(long, env = "GITHUB_APP_ID", value_parser = clap::value_parser!(u64).range(1..))]
    pub github_app_id: u64,

    /// Secret holding the App's PEM private key.
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_SECRET")]
    pub github_app_private_key_secret: String,

    /// Repository holding the tracking issue, as `owner/repo`.
    #[arg(long, env = "CONTROL_ROOM_REPO")]
    pub control_room_repo: String,

    /// Tracking issue number.
    #[arg(long, env = "CONTROL_ROOM_ISSUE", value_parser = clap::value_parser!(u64).range(1..))]
    pub control_room_issue: u64,

    /// Installation used for chat-originated events.
    #[arg(long, env = "GITHUB_INSTALLATION_ID", value_parser = clap::value_parser!(u64).range(1..))]
    pub github_installation_id: u64,

    /// Secret holding the chat bot token.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN_SECRET", default_value = "telegram-bot-token")]
    pub telegram_bot_token_secret: String,

    /// Secret holding the model API key.
    #[arg(long, env = "ANTHROPIC_API_KEY_SECRET", default_value = "anthropic-api-key")]
    pub anthropic_api_key_secret: String,

    /// Model name.
    #[arg(long, env = "LLM_MODEL", default_value = llm::DEFAULT_MODEL)]
    pub llm_model: String,

    /// Where secrets are read from.
    #[arg(long, env = "SECRET_BACKEND", value_enum, default_value_t = SecretBackend::SecretManager)]
    pub secret_backend: SecretBackend,
}

/// Validated worker settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub port: u16,
    pub project: String,
    pub claim_check_bucket: String,
    pub github_app_id: u64,
    pub private_key_secret: SecretName,
    pub tracking_repository: RepositoryName,
    pub tracking_issue: IssueNumber,
    pub chat_installation: InstallationId,
    pub telegram_bot_token_secret: SecretName,
    pub anthropic_api_key_secret: SecretName,
    pub llm_model: String,
    pub secret_backend: SecretBackend,
}

impl WorkerArgs {
    /// Checks values clap cannot.
    pub fn validate(self) -> Result<WorkerSettings, ConfigError> {
        let tracking_repository = RepositoryName::new(self.control_room_repo.trim()).ok_or(ConfigError::Invalid {
            option: "CONTROL_ROOM_REPO",
            reason: "expected owner/repo",
        })?;

        Ok(WorkerSettings {
            port: self.port,
            project: non_empty("GCP_PROJECT_ID", Some(&self.project))?,
            claim_check_bucket: non_empty("CLAIM_CHECK_BUCKET", Some(&self.claim_check_bucket))?,
            github_app_id: self.github_app_id,
            private_key_secret: secret_name("GITHUB_APP_PRIVATE_KEY_SECRET", &self.github_app_private_key_secret)?,
            tracking_repository,
            tracking_issue: IssueNumber::new(self.control_room_issue),
            chat_installation: InstallationId::new(self.github_installation_id),
            telegram_bot_token_secret: secret_name("TELEGRAM_BOT_TOKEN_SECRET", &self.telegram_bot_token_secret)?,
            anthropic_api_key_secret: secret_name("ANTHROPIC_API_KEY_SECRET", &self.anthropic_api_key_secret)?,
            llm_model: non_empty("LLM_MODEL", Some(&self.llm_model))?,
            secret_backend: self.secret_backend,
        })
    }
}
