use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider};

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lake-all-in-one".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
        }
    }
}

/// OTLP providers kept alive for the process lifetime and flushed on shutdown.
pub struct TelemetryProviders {
    pub tracer_provider: TracerProvider,
    pub logger_provider: LoggerProvider,
}
