//! Logging and trace export.
//!
//! Structured JSON logs go to stdout, filtered by `RUST_LOG` (default `info`).
//! When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over
//! OTLP/gRPC.

use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Keeps the exporter alive; flush it with [`Telemetry::shutdown`].
pub struct Telemetry {
    provider: Option<TracerProvider>,
}

impl Telemetry {
    /// Installs the global subscriber.
    pub fn init(service_name: &'static str) -> anyhow::Result<Self> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let provider = match std::env::var(OTLP_ENDPOINT_VAR).ok().filter(|v| !v.trim().is_empty()) {
            Some(endpoint) => Some(otlp_provider(service_name, &endpoint)?),
            None => None,
        };
        let otel_layer = provider
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(service_name)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .with(otel_layer)
            .try_init()
            .context("installing tracing subscriber")?;

        Ok(Self { provider })
    }

    /// Flushes pending spans.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(error) = provider.shutdown() {
                eprintln!("trace exporter shutdown failed: {error}");
            }
        }
    }
}

fn otlp_provider(service_name: &'static str, endpoint: &str) -> anyhow::Result<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("building OTLP span exporter")?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name)]))
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
