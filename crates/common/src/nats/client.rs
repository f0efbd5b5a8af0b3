use crate::domain::StreamDefinition;
use crate::nats::traits::{InboundMessage, JetStreamConsumer, MessageAcker, PullConsumer};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Get-or-create every stream in `streams`.
    pub async fn ensure_streams(&self, streams: &[StreamDefinition]) -> Result<()> {
        for stream in streams {
            self.ensure_stream(stream).await?;
        }
        Ok(())
    }

    pub async fn ensure_stream(&self, stream: &StreamDefinition) -> Result<()> {
        debug!(stream = %stream.name, subjects = ?stream.subjects, "ensuring stream exists");

        if self.jetstream.get_stream(stream.name).await.is_ok() {
            info!(stream = %stream.name, "stream already exists");
            return Ok(());
        }

        let config = StreamConfig {
            name: stream.name.to_string(),
            subjects: stream.subjects.iter().map(|s| s.to_string()).collect(),
            description: Some(stream.description.to_string()),
            ..Default::default()
        };

        self.jetstream
            .create_stream(config)
            .await
            .with_context(|| format!("failed to create stream {}", stream.name))?;
        info!(stream = %stream.name, "created stream");

        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    /// Flush pending client writes, including outstanding acks.
    pub async fn close(&self) -> Result<()> {
        info!("closing NATS connection");
        self.client
            .flush()
            .await
            .context("failed to flush NATS connection")
    }
}

pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .context("failed to create consumer")?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }
}

pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<InboundMessage>> {
        use futures::StreamExt;

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("failed to fetch messages")?;

        let mut result = Vec::new();
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => result.push(into_inbound(message)),
                Err(e) => {
                    error!(error = %e, "error receiving message");
                }
            }
        }
        Ok(result)
    }
}

fn into_inbound(message: jetstream::Message) -> InboundMessage {
    let delivered = message.info().map(|info| info.delivered).unwrap_or(1);

    InboundMessage {
        subject: message.subject.to_string(),
        payload: message.payload.clone(),
        headers: message.headers.clone(),
        delivered,
        acker: Box::new(NatsMessageAcker { message }),
    }
}

struct NatsMessageAcker {
    message: jetstream::Message,
}

#[async_trait]
impl MessageAcker for NatsMessageAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| anyhow!("failed to acknowledge message: {e}"))
    }
}
