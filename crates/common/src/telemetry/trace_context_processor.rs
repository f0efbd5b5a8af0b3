use opentelemetry::logs::{AnyValue, LogRecord as LogRecordTrait};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{InstrumentationScope, Key};
use opentelemetry_sdk::logs::{LogProcessor, LogRecord, LogResult};
use opentelemetry_sdk::Resource;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Log processor copying `trace_id` / `span_id` onto every exported record as plain
/// attributes, so log backends can correlate deliveries with their spans.
#[derive(Debug)]
pub struct TraceContextLogProcessor<P: LogProcessor> {
    inner: P,
}

impl<P: LogProcessor> TraceContextLogProcessor<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

fn current_trace_ids(record: &LogRecord) -> Option<(String, String)> {
    if let Some(tc) = record.trace_context.as_ref() {
        return Some((tc.trace_id.to_string(), tc.span_id.to_string()));
    }

    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context.is_valid().then(|| {
        (
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        )
    })
}

impl<P: LogProcessor> LogProcessor for TraceContextLogProcessor<P> {
    fn emit(&self, record: &mut LogRecord, instrumentation: &InstrumentationScope) {
        if let Some((trace_id, span_id)) = current_trace_ids(record) {
            LogRecordTrait::add_attribute(
                record,
                Key::new("trace_id"),
                AnyValue::String(trace_id.into()),
            );
            LogRecordTrait::add_attribute(record, Key::new("span_id"), AnyValue::String(span_id.into()));
        }

        self.inner.emit(record, instrumentation);
    }

    fn force_flush(&self) -> LogResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> LogResult<()> {
        self.inner.shutdown()
    }

    fn set_resource(&self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
