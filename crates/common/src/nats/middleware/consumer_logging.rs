use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::nats::{ConsumeRequest, DeliveryOutcome};
use tower::{Layer, Service};
use tracing::{error, info, warn, Instrument, Span};

/// Tower layer logging one line per consumed delivery.
#[derive(Clone, Default)]
pub struct NatsConsumeLoggingLayer;

impl NatsConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeLoggingLayer {
    type Service = NatsConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = DeliveryOutcome> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let subject = req.subject.clone();
        let payload_size = req.payload.len();
        let delivered = req.delivered;
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(outcome @ DeliveryOutcome::Persisted { object_key, .. }) => {
                        info!(
                            subject = %subject,
                            payload_bytes = payload_size,
                            delivered,
                            outcome = outcome.label(),
                            object_key = %object_key,
                            duration_ms = %duration_ms,
                            "consumed from {subject} in {duration_ms}ms [persisted]"
                        );
                    }
                    Ok(outcome @ DeliveryOutcome::Quarantined { reason }) => {
                        warn!(
                            subject = %subject,
                            payload_bytes = payload_size,
                            delivered,
                            outcome = outcome.label(),
                            reason = %reason,
                            duration_ms = %duration_ms,
                            "consumed from {subject} in {duration_ms}ms [quarantined]"
                        );
                    }
                    Ok(outcome @ DeliveryOutcome::Lost { reason, error }) => {
                        error!(
                            subject = %subject,
                            payload_bytes = payload_size,
                            delivered,
                            outcome = outcome.label(),
                            reason = %reason,
                            error = %error,
                            duration_ms = %duration_ms,
                            "consumed from {subject} in {duration_ms}ms [lost]"
                        );
                    }
                    Err(e) => {
                        error!(
                            subject = %subject,
                            payload_bytes = payload_size,
                            delivered,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to consume from {subject} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
