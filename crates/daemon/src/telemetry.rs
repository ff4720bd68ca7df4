//! Optional OpenTelemetry export
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name (default: conveyor)
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=conveyor-dev \
//!     ./conveyor
//! ```

#[cfg(feature = "telemetry")]
pub use enabled::otel_layer;

#[cfg(not(feature = "telemetry"))]
pub use disabled::otel_layer;

fn endpoint() -> Option<String> {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()
}

#[cfg(feature = "telemetry")]
mod enabled {
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Layer;

    /// OTLP tracing layer, or None when no endpoint is configured
    pub fn otel_layer<S>() -> Result<Option<Box<dyn Layer<S> + Send + Sync>>>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        let Some(endpoint) = super::endpoint() else {
            return Ok(None);
        };
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "conveyor".to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name,
            )]))
            .build();
        let tracer = provider.tracer("conveyor");
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed()))
    }
}

#[cfg(not(feature = "telemetry"))]
mod disabled {
    use anyhow::Result;
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Layer;

    pub fn otel_layer<S>() -> Result<Option<Box<dyn Layer<S> + Send + Sync>>>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        if super::endpoint().is_some() {
            eprintln!("OTEL_EXPORTER_OTLP_ENDPOINT is set but the `telemetry` feature is not enabled");
        }
        Ok(None)
    }
}
