//! Diagnostic logging for the CLI.
//!
//! Logs go to stderr so stdout stays reserved for command output. The
//! timeline under `.crewflow/timeline/` is the product record and is written
//! regardless of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CREWFLOW_LOG";
/// `json` switches stderr output to one JSON object per line.
pub const LOG_FORMAT_ENV: &str = "CREWFLOW_LOG_FORMAT";

/// Keeps exporters alive until the command finishes.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("warning: trace export shutdown failed: {e}");
        }
    }
}

fn env_filter() -> EnvFilter {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Install the global subscriber.
///
/// ```bash
/// CREWFLOW_LOG=crewflow=debug crewflow status
/// ```
pub fn init() -> TelemetryGuard {
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (compact, json_layer) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().compact().with_writer(std::io::stderr)), None)
    };

    #[cfg(feature = "otel")]
    let (otel_layer, provider) = otel::layer();
    #[cfg(not(feature = "otel"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = None;

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(compact)
        .with(json_layer)
        .with(otel_layer)
        .try_init();

    TelemetryGuard {
        #[cfg(feature = "otel")]
        provider,
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
    use tracing_opentelemetry::OpenTelemetryLayer;

    /// Export is enabled only when an OTLP endpoint is configured.
    pub fn layer<S>() -> (
        Option<OpenTelemetryLayer<S, SdkTracer>>,
        Option<SdkTracerProvider>,
    )
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_none() {
            return (None, None);
        }
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()
        {
            Ok(exporter) => exporter,
            Err(e) => {
                eprintln!("warning: OTLP exporter unavailable: {e}");
                return (None, None);
            }
        };
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(Resource::builder().with_service_name("crewflow").build())
            .build();
        let tracer = provider.tracer("crewflow");
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        )
    }
}
