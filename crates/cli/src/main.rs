//! Event airlock entry point.
//!
//! This binary is the composition root for both services:
//!
//! - `airlock gateway` verifies webhook deliveries, records them in the
//!   idempotency ledger and enqueues a task for each new event.
//! - `airlock worker` receives those tasks and talks to GitHub, the language
//!   model and the chat platform.
//!
//! Configuration comes from flags or environment variables (see [`config`]);
//! logs and traces are wired in [`telemetry`].

mod config;
mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use domain::{ClaimCheckStore, IdempotencyLedger, SecretSource, TaskQueue};
use gcp::{
    AccessTokenSource, CloudTasksQueue, EnvSecretSource, FirestoreLedger, GcsClaimCheckStore,
    InMemoryClaimCheckStore, InMemoryLedger, InMemoryTaskQueue, MetadataTokenSource, QueueTarget,
    SecretManagerSource,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Cli, Command, GatewaySettings, GatewayStorage, SecretBackend, WorkerSettings};
use crate::telemetry::Telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = Telemetry::init(cli.command.service_name())?;

    let result = match cli.command {
        Command::Gateway(args) => run_gateway(args.validate()?).await,
        Command::Worker(args) => run_worker(args.validate()?).await,
    };

    telemetry.shutdown();
    result
}

async fn run_gateway(settings: GatewaySettings) -> anyhow::Result<()> {
    let http = reqwest::Client::new();

    let (ledger, claim_checks, queue): (Arc<dyn IdempotencyLedger>, Arc<dyn ClaimCheckStore>, Arc<dyn TaskQueue>) =
        match settings.storage {
            GatewayStorage::Memory => {
                warn!("in-memory backend selected; tasks are recorded but never delivered");
                (
                    Arc::new(InMemoryLedger::new()),
                    Arc::new(InMemoryClaimCheckStore::new()),
                    Arc::new(InMemoryTaskQueue::new()),
                )
            }
            GatewayStorage::Gcp {
                project,
                bucket,
                ledger_collection,
                queue_location,
                queue_name,
                worker_url,
                invoker_service_account,
            } => {
                let tokens: Arc<dyn AccessTokenSource> = Arc::new(MetadataTokenSource::new(http.clone()));
                let target = QueueTarget {
                    project: project.clone(),
                    location: queue_location,
                    queue: queue_name,
                    worker_url,
                    invoker_service_account,
                };
                (
                    Arc::new(FirestoreLedger::new(http.clone(), project, ledger_collection, tokens.clone())),
                    Arc::new(GcsClaimCheckStore::new(http.clone(), bucket, tokens.clone())),
                    Arc::new(CloudTasksQueue::new(http, target, tokens)),
                )
            }
        };

    if settings.telegram_webhook_secret.is_none() {
        warn!("TELEGRAM_WEBHOOK_SECRET is not set; chat updates will be admitted unauthenticated");
    }

    let mut config = airlock::AirlockConfig::new(settings.webhook_secret, settings.telegram_webhook_secret);
    config.claim_check_threshold = settings.claim_check_threshold;
    let gateway = airlock::Airlock::new(config, ledger, claim_checks, queue);

    let app = airlock::build_router(airlock::AppState::new(Arc::new(gateway)));
    serve("airlock", settings.port, app).await
}

async fn run_worker(settings: WorkerSettings) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let tokens: Arc<dyn AccessTokenSource> = Arc::new(MetadataTokenSource::new(http.clone()));

    let secrets: Arc<dyn SecretSource> = match settings.secret_backend {
        SecretBackend::SecretManager => {
            Arc::new(SecretManagerSource::new(http.clone(), settings.project.clone(), tokens.clone()))
        }
        SecretBackend::Env => Arc::new(EnvSecretSource::from_env()),
    };

    let dispatcher = worker::Dispatcher::new(
        worker::WorkerConfig {
            tracking_repository: settings.tracking_repository,
            tracking_issue: settings.tracking_issue,
            chat_installation: settings.chat_installation,
        },
        Arc::new(GcsClaimCheckStore::new(http.clone(), settings.claim_check_bucket, tokens)),
        Arc::new(github::AppTokenProvider::new(
            http.clone(),
            settings.github_app_id,
            settings.private_key_secret,
            secrets.clone(),
        )),
        Arc::new(github::GitHubClient::new(http.clone())),
        Arc::new(telegram::TelegramMessenger::new(
            http.clone(),
            settings.telegram_bot_token_secret,
            secrets.clone(),
        )),
        Arc::new(llm::AnthropicProvider::new(
            http,
            settings.llm_model,
            settings.anthropic_api_key_secret,
            secrets,
        )),
    );

    let app = worker::build_router(worker::AppState::new(Arc::new(dispatcher)));
    serve("worker", settings.port, app).await
}

async fn serve(service: &'static str, port: u16, app: axum::Router) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(service, %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    info!(service, "stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
