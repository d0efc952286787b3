//! Log output and span export.

use std::io;

use opentelemetry::trace::TraceId;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, EnvFilter, Layer, Registry};

const SERVICE_NAME: &str = "alert-management";

/// Shape of the lines written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per event, carrying the fields of the current span.
    Json,
}

#[derive(Clone, Debug, clap::Args)]
pub struct LogOptions {
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub format: LogFormat,

    /// Filter directives used when RUST_LOG is not set.
    #[arg(long = "log-filter", env = "LOG_FILTER", default_value = "info")]
    pub filter: String,

    /// OTLP collector receiving spans. Needs the `telemetry` feature.
    #[arg(long = "otlp-endpoint", env = "OPENTELEMETRY_ENDPOINT_URL")]
    pub otlp_endpoint: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "info".into(),
            otlp_endpoint: None,
        }
    }
}

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> Option<TraceId> {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context

    match tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
    {
        TraceId::INVALID => None,
        valid => Some(valid),
    }
}

fn fmt_layer<W>(format: LogFormat, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .boxed(),
    }
}

fn env_filter(fallback: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(fallback)?),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracer_provider(
    otlp_endpoint: &str,
) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use anyhow::Context as _;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

/// Install the global subscriber
pub fn init(options: &LogOptions) -> anyhow::Result<()> {
    let logger = fmt_layer(options.format, io::stdout);
    let env_filter = env_filter(&options.filter)?;

    #[cfg(feature = "telemetry")]
    let collector = {
        use anyhow::Context as _;
        use opentelemetry::trace::TracerProvider;

        let endpoint = options.otlp_endpoint.as_deref().context(
            "Need a otel tracing collector configured via --otlp-endpoint or OPENTELEMETRY_ENDPOINT_URL",
        )?;
        let provider = init_tracer_provider(endpoint)?;
        let tracer = provider.tracer(SERVICE_NAME);
        // Set the global tracer provider so it stays alive
        opentelemetry::global::set_tracer_provider(provider);
        Registry::default()
            .with(logger)
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(env_filter)
    };
    #[cfg(not(feature = "telemetry"))]
    let collector = Registry::default().with(logger).with(env_filter);

    tracing::subscriber::set_global_default(collector)?;

    #[cfg(not(feature = "telemetry"))]
    if let Some(endpoint) = &options.otlp_endpoint {
        tracing::warn!(endpoint = %endpoint, "Span export requested but built without the telemetry feature");
    }
    Ok(())
}
