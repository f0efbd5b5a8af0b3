use crate::domain::IngestionService;
use common::nats::{ConsumeRequest, DeliveryOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Tower service handing each delivery to the [`IngestionService`].
///
/// Never fails: every processing error has already become a quarantined or lost outcome.
#[derive(Clone)]
pub struct IngestDeliveryService {
    ingestion: Arc<IngestionService>,
}

impl IngestDeliveryService {
    pub fn new(ingestion: Arc<IngestionService>) -> Self {
        Self { ingestion }
    }
}

impl Service<ConsumeRequest> for IngestDeliveryService {
    type Response = DeliveryOutcome;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<DeliveryOutcome, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let ingestion = self.ingestion.clone();

        Box::pin(async move {
            Ok(ingestion
                .ingest(&req.subject, &req.payload, req.received_at)
                .await)
        })
    }
}
