use crate::domain::IngestionService;
use crate::nats::IngestDeliveryService;
use common::domain::CHANNELS;
use common::nats::{
    JetStreamConsumer, NatsConsumeLoggingLayer, NatsConsumeLoggingService,
    NatsConsumeTracingConfig, NatsConsumeTracingLayer, NatsConsumeTracingService, TowerConsumer,
    TowerConsumerConfig,
};
use lake_runner::AppProcess;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::info;

type DeliveryStack =
    NatsConsumeTracingService<NatsConsumeLoggingService<IngestDeliveryService>>;

#[derive(Debug, Clone)]
pub struct IngestionWorkerConfig {
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub ack_wait: Duration,
    pub max_fetch_failures: u32,
}

/// One durable consumer per channel, all feeding the same [`IngestionService`].
pub struct IngestionWorker {
    consumers: Vec<TowerConsumer<DeliveryStack>>,
}

impl IngestionWorker {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        ingestion: Arc<IngestionService>,
        config: IngestionWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("initializing ingestion worker");

        let mut consumers = Vec::with_capacity(CHANNELS.len());

        for channel in &CHANNELS {
            let service = ServiceBuilder::new()
                .layer(NatsConsumeTracingLayer::new(NatsConsumeTracingConfig::new(
                    format!("ingest {}", channel.subject),
                )))
                .layer(NatsConsumeLoggingLayer::new())
                .service(IngestDeliveryService::new(ingestion.clone()));

            let consumer = TowerConsumer::new(
                jetstream.clone(),
                TowerConsumerConfig {
                    stream_name: channel.stream.to_string(),
                    consumer_name: channel.durable_name.to_string(),
                    filter_subject: channel.subject.to_string(),
                    batch_size: config.batch_size,
                    max_wait: config.batch_wait,
                    ack_wait: config.ack_wait,
                    max_fetch_failures: config.max_fetch_failures,
                },
                service,
            )
            .await?;

            consumers.push(consumer);
        }

        info!(consumers = consumers.len(), "ingestion worker initialized");

        Ok(Self { consumers })
    }

    /// Named runner processes, one per channel consumer.
    pub fn into_runner_processes(self) -> Vec<(String, AppProcess)> {
        self.consumers
            .into_iter()
            .map(|consumer| {
                let name = consumer.consumer_name().to_string();
                let process: AppProcess =
                    Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }));
                (name, process)
            })
            .collect()
    }
}
