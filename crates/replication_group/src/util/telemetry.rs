use tracing_subscriber::{prelude::*, util::TryInitError, EnvFilter, Registry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> opentelemetry::trace::TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

/// Initialize tracing
pub fn init(format: LogFormat) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Compact => Registry::default()
            .with(tracing_subscriber::fmt::layer().compact())
            .with(env_filter)
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(tracing_subscriber::fmt::layer().json())
            .with(env_filter)
            .try_init(),
    }
}
