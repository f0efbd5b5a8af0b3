use crate::domain::{Channel, DeadLetterRecord, IngestResult, MetadataDocument, ObjectKey};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Immutable store for encoded payloads.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawObjectSink: Send + Sync {
    /// Write `payload` under the key derived from `channel` and `received_at`.
    /// A key collision overwrites.
    async fn put_raw(
        &self,
        channel: &Channel,
        received_at: DateTime<Utc>,
        payload: Bytes,
    ) -> IngestResult<ObjectKey>;
}

/// Append-only per-channel collections of metadata documents.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn put_metadata(&self, channel: &Channel, document: &MetadataDocument)
        -> IngestResult<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn quarantine(&self, record: &DeadLetterRecord) -> IngestResult<()>;
}
