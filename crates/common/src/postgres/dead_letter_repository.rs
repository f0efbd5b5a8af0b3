use crate::domain::{DeadLetterRecord, DeadLetterSink, IngestError, IngestResult};
use crate::postgres::{PostgresClient, DEAD_LETTER_TABLE};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

const SINK: &str = "dead_letter";

#[derive(Clone)]
pub struct PostgresDeadLetterRepository {
    client: PostgresClient,
}

impl PostgresDeadLetterRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeadLetterSink for PostgresDeadLetterRepository {
    async fn quarantine(&self, record: &DeadLetterRecord) -> IngestResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| IngestError::sink_unavailable(SINK, e))?;

        let sql = format!(
            "INSERT INTO {DEAD_LETTER_TABLE} (subject, kind, error, raw, received_at, quarantined_at)
             VALUES ($1, $2, $3, $4, $5, $6)"
        );

        conn.execute(
            sql.as_str(),
            &[
                &record.subject,
                &record.kind.map(|kind| kind.as_str()),
                &record.error,
                &record.raw,
                &record.received_at,
                &Utc::now(),
            ],
        )
        .await
        .map_err(|e| IngestError::sink_unavailable(SINK, e))?;

        debug!(subject = %record.subject, error = %record.error, "dead letter stored");
        Ok(())
    }
}
