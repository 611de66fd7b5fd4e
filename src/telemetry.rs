//! Tracing setup for zoekt_code_search.
//!
//! Console logs always go to stderr so that `status` JSON and search
//! results on stdout stay machine readable. Spans are additionally exported
//! over OTLP/gRPC when `[telemetry] enabled = true`.

use crate::config::TelemetryConfig;
use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
///
/// # Errors
/// Returns an error if the OTLP exporter cannot be built.
pub fn init_telemetry(config: &TelemetryConfig, log_level: Level) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if config.enabled {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.otlp_endpoint.as_str())
            .build()
            .context("Failed to build OTLP span exporter")?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )]))
            .build();

        let tracer = provider.tracer(config.service_name.clone());

        // Registered globally so shutdown_telemetry can flush it
        opentelemetry::global::set_tracer_provider(provider);

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();

        tracing::info!(
            otlp_endpoint = %config.otlp_endpoint,
            service_name = %config.service_name,
            "OpenTelemetry tracing enabled"
        );
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();

        tracing::debug!("OpenTelemetry tracing disabled, console-only logging active");
    }

    Ok(())
}

/// Flush pending spans before the process exits.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::debug!("OpenTelemetry tracer provider shut down");
}
