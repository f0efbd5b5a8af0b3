use crate::nats::{
    ConsumeRequest, DeliveryOutcome, InboundMessage, JetStreamConsumer, PullConsumer,
};
use anyhow::{Context, Result};
use async_nats::jetstream;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TowerConsumerConfig {
    pub stream_name: String,
    pub consumer_name: String,
    pub filter_subject: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Broker redelivers a message not acknowledged within this window.
    pub ack_wait: Duration,
    /// Consecutive fetch failures tolerated before `run` returns an error.
    pub max_fetch_failures: u32,
}

/// Durable, explicitly-acknowledged pull consumer driving one delivery at a time
/// through a Tower service.
///
/// Every delivery handed to the service is acknowledged exactly once, whatever the
/// service returns. Cancellation is only observed between deliveries.
pub struct TowerConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    config: TowerConsumerConfig,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<ConsumeRequest, Response = DeliveryOutcome, Error = anyhow::Error>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        config: TowerConsumerConfig,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            filter_subject = %config.filter_subject,
            ack_wait_secs = config.ack_wait.as_secs(),
            "creating tower nats consumer"
        );

        let pull_config = jetstream::consumer::pull::Config {
            name: Some(config.consumer_name.clone()),
            durable_name: Some(config.consumer_name.clone()),
            filter_subject: config.filter_subject.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: config.ack_wait,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(pull_config, &config.stream_name)
            .await
            .with_context(|| format!("failed to create consumer {}", config.consumer_name))?;

        Ok(Self {
            consumer,
            config,
            service,
        })
    }

    pub fn consumer_name(&self) -> &str {
        &self.config.consumer_name
    }

    /// Run until `ctx` is cancelled, or until fetching fails `max_fetch_failures` times in a row.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.config.stream_name,
            consumer = %self.config.consumer_name,
            filter_subject = %self.config.filter_subject,
            "starting tower nats consumer"
        );

        let mut consecutive_failures = 0u32;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                result = self.consumer.fetch_messages(self.config.batch_size, self.config.max_wait) => result,
            };

            match fetched {
                Ok(messages) => {
                    consecutive_failures = 0;
                    self.process_batch(messages, &ctx).await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    error!(
                        consumer = %self.config.consumer_name,
                        error = %e,
                        consecutive_failures,
                        "failed to fetch messages"
                    );

                    if consecutive_failures >= self.config.max_fetch_failures {
                        return Err(e.context(format!(
                            "consumer {} gave up after {} consecutive fetch failures",
                            self.config.consumer_name, consecutive_failures
                        )));
                    }

                    tokio::select! {
                        biased;
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(FETCH_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!(
            consumer = %self.config.consumer_name,
            "consumer stopped gracefully"
        );
        Ok(())
    }

    /// Process a fetched batch in order. Returns the number of deliveries acknowledged.
    async fn process_batch(
        &mut self,
        messages: Vec<InboundMessage>,
        ctx: &CancellationToken,
    ) -> usize {
        if messages.is_empty() {
            debug!(consumer = %self.config.consumer_name, "no messages in batch");
            return 0;
        }

        let total = messages.len();
        let mut processed = 0;

        for message in messages {
            if ctx.is_cancelled() {
                warn!(
                    consumer = %self.config.consumer_name,
                    unprocessed = total - processed,
                    "shutdown requested, leaving remaining deliveries for redelivery"
                );
                break;
            }

            self.process_message(message).await;
            processed += 1;
        }

        processed
    }

    async fn process_message(&mut self, message: InboundMessage) {
        let InboundMessage {
            subject,
            payload,
            headers,
            delivered,
            acker,
        } = message;

        if delivered > 1 {
            debug!(subject = %subject, delivered, "processing redelivered message");
        }

        let request = ConsumeRequest::new(subject.clone(), payload, headers, delivered, Utc::now());

        let result = match ServiceExt::<ConsumeRequest>::ready(&mut self.service).await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!(
                subject = %subject,
                error = %e,
                "service error processing message, acknowledging anyway"
            );
        }

        if let Err(e) = acker.ack().await {
            error!(
                subject = %subject,
                error = %e,
                "failed to acknowledge message, broker will redeliver after ack wait"
            );
        }
    }
}
