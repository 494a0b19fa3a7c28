use crate::error::{AskDbError, Result};
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_sdk::Resource;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

pub struct OtelGuard {
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            // flush remaining spans on shutdown
            if let Err(e) = provider.shutdown() {
                eprintln!("error shutting down tracer provider: {}", e);
            }
        }
    }
}

fn tracing_enabled() -> bool {
    env::var("ASKDB_ENABLE_TRACING")
        .map(|v| {
            let v = v.to_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false)
}

fn collector_endpoint() -> Option<String> {
    env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .or_else(|_| env::var("PHOENIX_COLLECTOR_ENDPOINT"))
        .ok()
        .filter(|s| !s.is_empty())
}

/// installs the global subscriber; logs go to stderr so stdout carries only
/// query output
pub fn init_tracing(service_name: &str) -> Result<OtelGuard> {
    let endpoint = match collector_endpoint() {
        Some(endpoint) if tracing_enabled() => endpoint,
        _ => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
                )
                .try_init()
                .map_err(|e| AskDbError::Tracing(e.to_string()))?;

            tracing::debug!("basic logging initialized (service={})", service_name);

            return Ok(OtelGuard {
                tracer_provider: None,
            });
        }
    };

    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
        .map_err(|e| AskDbError::Tracing(format!("exporter build failed: {}", e)))?;

    let resource = Resource::builder_empty()
        .with_attribute(KeyValue::new("service.name", service_name.to_string()))
        .build();

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let telemetry =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()));

    tracing_subscriber::registry()
        .with(telemetry)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .try_init()
        .map_err(|e| AskDbError::Tracing(e.to_string()))?;

    tracing::info!(
        "opentelemetry tracing initialized for {} (endpoint: {})",
        service_name,
        endpoint
    );

    Ok(OtelGuard {
        tracer_provider: Some(provider),
    })
}
