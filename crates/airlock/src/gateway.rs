//! The per-request admission state machine.
//!
//! ```text
//! received -> signature-checked -> dedupe-checked -> filtered -> sized -> enqueued
//!     |              |                   |              |          |
//! Unauthorized  MissingDeliveryId    Duplicate      Malformed   Failed
//!                                    Failed         Ignored
//! ```
//!
//! The idempotency record is written right after authentication and before
//! the body is parsed, so duplicates are cheap and can never enqueue twice.
//! Authentication comes first so forged deliveries cannot pollute the ledger.
//! Task submission is the last externally visible step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::signature::{verify_hub_signature, verify_shared_token, TokenCheck};
use domain::{
    normalize_github, normalize_telegram, probe_update_id, screen, ClaimCheckStore, CorrelationId,
    CreateOutcome, DeliveryId, ErrorCategory, EventEnvelope, EventSource, FilterReason,
    IdempotencyLedger, IdempotencyRecord, NormalizeError, Normalized, PayloadMode, QueuedTask,
    TaskName, TaskPlan, TaskQueue, Timestamp, DEFAULT_CLAIM_CHECK_THRESHOLD,
};
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Gateway settings.
#[derive(Clone)]
pub struct AirlockConfig {
    /// HMAC secret shared with the git host.
    pub github_secret: Vec<u8>,
    /// Token shared with the chat platform. `None` admits chat updates
    /// unauthenticated (logged on every request).
    pub telegram_secret: Option<String>,
    /// Largest serialized envelope, in bytes, that travels inline.
    pub claim_check_threshold: usize,
}

impl AirlockConfig {
    /// Settings with the default claim-check threshold.
    pub fn new(github_secret: impl Into<Vec<u8>>, telegram_secret: Option<String>) -> Self {
        Self {
            github_secret: github_secret.into(),
            telegram_secret,
            claim_check_threshold: DEFAULT_CLAIM_CHECK_THRESHOLD,
        }
    }
}

impl std::fmt::Debug for AirlockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirlockConfig")
            .field("github_secret", &"<redacted>")
            .field("telegram_secret", &self.telegram_secret.as_ref().map(|_| "<redacted>"))
            .field("claim_check_threshold", &self.claim_check_threshold)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// The parts of a git-host delivery the gateway reads.
#[derive(Debug, Clone, Copy)]
pub struct GitHubDelivery<'a> {
    /// `X-Hub-Signature-256`.
    pub signature: Option<&'a str>,
    /// `X-GitHub-Delivery`.
    pub delivery_id: Option<&'a str>,
    /// `X-GitHub-Event`.
    pub event: Option<&'a str>,
    /// Raw request body, exactly as received.
    pub body: &'a [u8],
}

/// The parts of a chat-platform update the gateway reads.
#[derive(Debug, Clone, Copy)]
pub struct TelegramDelivery<'a> {
    /// `X-Telegram-Bot-Api-Secret-Token`.
    pub secret_token: Option<&'a str>,
    /// Raw request body.
    pub body: &'a [u8],
}

/// Gates a request passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    /// Request accepted by the HTTP layer.
    Received,
    /// Signature or token verified.
    SignatureChecked,
    /// Idempotency record created.
    DedupeChecked,
    /// Parsed, normalized, and past the guards.
    Filtered,
    /// Inline vs. claim-check decided (and blob written, if any).
    Sized,
    /// Task submitted.
    Enqueued,
}

impl GateStage {
    /// Stable kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            GateStage::Received => "received",
            GateStage::SignatureChecked => "signature-checked",
            GateStage::DedupeChecked => "dedupe-checked",
            GateStage::Filtered => "filtered",
            GateStage::Sized => "sized",
            GateStage::Enqueued => "enqueued",
        }
    }
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Bad or missing signature/token. Nothing was written.
    Unauthorized,
    /// No delivery identifier. Nothing was written.
    MissingDeliveryId,
    /// The delivery was admitted before.
    Duplicate {
        /// The repeated delivery id.
        delivery_id: DeliveryId,
    },
    /// The body could not be parsed or lacks required fields.
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },
    /// Well-formed but not for processing.
    Ignored {
        /// Why.
        reason: FilterReason,
    },
    /// A collaborator failed. Reported to the source as accepted.
    Failed {
        /// Last gate passed before the failure.
        stage: GateStage,
        /// Short description, without collaborator error text.
        reason: &'static str,
    },
    /// A task was submitted.
    Enqueued {
        /// Correlation id assigned at admission.
        correlation_id: CorrelationId,
        /// How the envelope travels.
        payload_mode: PayloadMode,
        /// Queue-assigned task name.
        task_name: TaskName,
        /// Time spent in the gateway.
        elapsed: Duration,
    },
}

impl Admission {
    /// Error category of the outcome; `None` when enqueued.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Admission::Unauthorized => Some(ErrorCategory::AuthenticationFailure),
            Admission::MissingDeliveryId | Admission::Malformed { .. } => Some(ErrorCategory::MalformedInput),
            Admission::Duplicate { .. } => Some(ErrorCategory::DuplicateDelivery),
            Admission::Ignored { reason } => Some(reason.category()),
            Admission::Failed { .. } => Some(ErrorCategory::DependencyFailure),
            Admission::Enqueued { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Verifies, deduplicates, normalizes and enqueues webhook deliveries.
pub struct Airlock {
    config: AirlockConfig,
    ledger: Arc<dyn IdempotencyLedger>,
    claim_checks: Arc<dyn ClaimCheckStore>,
    queue: Arc<dyn TaskQueue>,
}

impl Airlock {
    /// Creates a gateway over the given collaborators.
    pub fn new(
        config: AirlockConfig,
        ledger: Arc<dyn IdempotencyLedger>,
        claim_checks: Arc<dyn ClaimCheckStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self { config, ledger, claim_checks, queue }
    }

    /// Runs a git-host delivery through the gates.
    pub async fn admit_github(&self, delivery: GitHubDelivery<'_>) -> Admission {
        let span = info_span!(
            "airlock.admit",
            source = EventSource::GitHub.as_str(),
            delivery_id = Empty,
            correlation_id = Empty
        );
        self.github_gates(delivery).instrument(span).await
    }

    /// Runs a chat-platform update through the gates.
    pub async fn admit_telegram(&self, delivery: TelegramDelivery<'_>) -> Admission {
        let span = info_span!(
            "airlock.admit",
            source = EventSource::Telegram.as_str(),
            delivery_id = Empty,
            correlation_id = Empty
        );
        self.telegram_gates(delivery).instrument(span).await
    }

    async fn github_gates(&self, delivery: GitHubDelivery<'_>) -> Admission {
        let started = Instant::now();

        if !verify_hub_signature(delivery.body, delivery.signature, &self.config.github_secret) {
            warn!("signature verification failed");
            return Admission::Unauthorized;
        }

        let Some(delivery_id) = delivery.delivery_id.map(str::trim).and_then(DeliveryId::new) else {
            warn!("delivery id header missing");
            return Admission::MissingDeliveryId;
        };
        Span::current().record("delivery_id", delivery_id.as_str());

        self.admit_verified(EventSource::GitHub, delivery_id, started, |id, received_at| {
            normalize_github(delivery.event, id, received_at, delivery.body)
        })
        .await
    }

    async fn telegram_gates(&self, delivery: TelegramDelivery<'_>) -> Admission {
        let started = Instant::now();

        match verify_shared_token(self.config.telegram_secret.as_deref(), delivery.secret_token) {
            TokenCheck::Verified => {}
            TokenCheck::Unconfigured => {
                warn!("no chat webhook secret configured, admitting update unauthenticated");
            }
            TokenCheck::Rejected => {
                warn!("chat webhook secret token mismatch");
                return Admission::Unauthorized;
            }
        }

        // The update id lives in the body, so this probe is the only parsing
        // that happens before the ledger write.
        let update_id = match probe_update_id(delivery.body) {
            Ok(Some(update_id)) => update_id,
            Ok(None) => {
                warn!("update_id missing");
                return Admission::MissingDeliveryId;
            }
            Err(err) => {
                warn!(error = %err, "malformed chat update");
                return Admission::Malformed { reason: err.to_string() };
            }
        };
        let Some(delivery_id) = DeliveryId::new(update_id.to_string()) else {
            return Admission::MissingDeliveryId;
        };
        Span::current().record("delivery_id", delivery_id.as_str());

        self.admit_verified(EventSource::Telegram, delivery_id, started, |id, received_at| {
            normalize_telegram(id, received_at, delivery.body)
        })
        .await
    }

    async fn admit_verified<F>(
        &self,
        source: EventSource,
        delivery_id: DeliveryId,
        started: Instant,
        normalize: F,
    ) -> Admission
    where
        F: FnOnce(DeliveryId, Timestamp) -> Result<Normalized, NormalizeError>,
    {
        let received_at = Timestamp::now();
        let record = IdempotencyRecord::admitted(source, &delivery_id, received_at);
        match self.ledger.create(&record).await {
            Ok(CreateOutcome::Created) => debug!(key = %record.key, "delivery recorded"),
            Ok(CreateOutcome::AlreadyExists) => {
                info!(key = %record.key, "duplicate delivery");
                return Admission::Duplicate { delivery_id };
            }
            Err(err) => {
                error!(error = %err, "idempotency ledger unavailable");
                return Admission::Failed {
                    stage: GateStage::SignatureChecked,
                    reason: "idempotency ledger unavailable",
                };
            }
        }

        let envelope = match normalize(delivery_id, received_at) {
            Ok(Normalized::Admitted(envelope)) => envelope,
            Ok(Normalized::Ignored(reason)) => {
                info!(reason = %reason, "event ignored");
                return Admission::Ignored { reason };
            }
            Err(err) => {
                warn!(error = %err, "malformed payload");
                return Admission::Malformed { reason: err.to_string() };
            }
        };

        if let Some(reason) = screen(&envelope) {
            info!(reason = %reason, "event dropped by guard");
            return Admission::Ignored { reason };
        }

        Span::current().record("correlation_id", envelope.correlation_id().as_str());
        self.enqueue(envelope, started).await
    }

    async fn enqueue(&self, envelope: EventEnvelope, started: Instant) -> Admission {
        let plan = match TaskPlan::for_envelope(&envelope, self.config.claim_check_threshold, Timestamp::now()) {
            Ok(plan) => plan,
            Err(err) => {
                error!(error = %err, "envelope serialization failed");
                return Admission::Failed { stage: GateStage::Filtered, reason: "envelope serialization failed" };
            }
        };
        let payload_mode = plan.mode();

        let task = match plan {
            TaskPlan::Inline { task, size } => {
                debug!(size, "envelope travels inline");
                task
            }
            TaskPlan::ClaimCheck { key, blob, task } => {
                let size = blob.len();
                if let Err(err) = self.claim_checks.put(&key, blob).await {
                    error!(error = %err, locator = %key, "claim-check write failed");
                    return Admission::Failed { stage: GateStage::Filtered, reason: "claim-check write failed" };
                }
                info!(size, locator = %key, "envelope stored out of band");
                task
            }
        };

        let body = match serde_json::to_vec(&task) {
            Ok(body) => body,
            Err(err) => {
                error!(error = %err, "task serialization failed");
                return Admission::Failed { stage: GateStage::Sized, reason: "task serialization failed" };
            }
        };
        let correlation_id = task.correlation_id().clone();

        match self.queue.enqueue(QueuedTask { correlation_id: correlation_id.clone(), body }).await {
            Ok(task_name) => {
                let elapsed = started.elapsed();
                info!(
                    task_name = %task_name,
                    payload_mode = payload_mode.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "event enqueued"
                );
                Admission::Enqueued { correlation_id, payload_mode, task_name, elapsed }
            }
            Err(err) => {
                error!(error = %err, "task queue unavailable");
                Admission::Failed { stage: GateStage::Sized, reason: "task queue unavailable" }
            }
        }
    }
}
