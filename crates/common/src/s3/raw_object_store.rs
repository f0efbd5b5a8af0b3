use crate::domain::{Channel, IngestError, IngestResult, ObjectKey, RawObjectSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub const RAW_OBJECT_CONTENT_TYPE: &str = "application/avro";

const SINK: &str = "raw_object";

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// S3-compatible store for encoded payloads, addressed by [`ObjectKey`].
#[derive(Clone)]
pub struct S3RawObjectStore {
    client: Client,
    bucket: String,
}

impl S3RawObjectStore {
    /// Build a path-style client. Explicit credentials, when both are set, override the
    /// default AWS credential chain.
    pub async fn new(config: S3Config) -> Self {
        let region = Region::new(config.region.clone());

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .region(region)
            .force_path_style(true);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            builder =
                builder.credentials_provider(Credentials::new(access_key, secret_key, None, None, "env"));
        }

        info!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            "raw object store initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket unless it already exists.
    pub async fn ensure_bucket(&self) -> Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            info!(bucket = %self.bucket, "bucket already exists");
            return Ok(());
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "created bucket");
                Ok(())
            }
            Err(SdkError::ServiceError(err))
                if err.err().is_bucket_already_owned_by_you() =>
            {
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to create bucket {}", self.bucket)),
        }
    }

    /// Read back a stored object.
    pub async fn get_raw(&self, key: &ObjectKey) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .with_context(|| format!("failed to get object {key}"))?;

        let body = output
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read object body {key}"))?;

        Ok(body.into_bytes())
    }
}

#[async_trait]
impl RawObjectSink for S3RawObjectStore {
    async fn put_raw(
        &self,
        channel: &Channel,
        received_at: DateTime<Utc>,
        payload: Bytes,
    ) -> IngestResult<ObjectKey> {
        let key = ObjectKey::derive(channel, received_at);
        let size = payload.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(ByteStream::from(payload))
            .content_type(RAW_OBJECT_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| {
                IngestError::sink_unavailable(SINK, anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            })?;

        debug!(object_key = %key, size, "raw object stored");
        Ok(key)
    }
}
