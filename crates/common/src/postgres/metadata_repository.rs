use crate::domain::{Channel, IngestError, IngestResult, MetadataDocument, MetadataSink};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

const SINK: &str = "metadata";

/// Appends metadata documents to the channel's collection table. No uniqueness is enforced,
/// so a redelivered message yields a second row.
#[derive(Clone)]
pub struct PostgresMetadataRepository {
    client: PostgresClient,
}

impl PostgresMetadataRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataSink for PostgresMetadataRepository {
    async fn put_metadata(
        &self,
        channel: &Channel,
        document: &MetadataDocument,
    ) -> IngestResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| IngestError::sink_unavailable(SINK, e))?;

        let sql = format!(
            "INSERT INTO {} (subject, object_key, received_at, document, stored_at)
             VALUES ($1, $2, $3, $4, $5)",
            channel.collection
        );
        let body = Value::Object(document.document.clone());

        conn.execute(
            sql.as_str(),
            &[
                &document.subject,
                &document.object_key.as_str(),
                &document.received_at,
                &body,
                &Utc::now(),
            ],
        )
        .await
        .map_err(|e| IngestError::sink_unavailable(SINK, e))?;

        debug!(
            collection = channel.collection,
            object_key = %document.object_key,
            "metadata document stored"
        );
        Ok(())
    }
}
