use crate::domain::Channel;
use crate::postgres::PostgresClient;
use anyhow::{Context, Result};
use tracing::info;

pub const DEAD_LETTER_TABLE: &str = "dead_letter";

/// Create every metadata collection table and the dead-letter table if missing.
///
/// Table names come from the static channel table only.
pub async fn ensure_schema(client: &PostgresClient) -> Result<()> {
    let conn = client.get_connection().await?;

    for collection in Channel::collections() {
        conn.batch_execute(&collection_ddl(collection))
            .await
            .with_context(|| format!("failed to create table {collection}"))?;
    }

    conn.batch_execute(&dead_letter_ddl())
        .await
        .context("failed to create dead letter table")?;

    info!(
        collections = Channel::collections().len(),
        "metadata store schema ready"
    );
    Ok(())
}

fn collection_ddl(collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {collection} (
            id BIGSERIAL PRIMARY KEY,
            subject TEXT NOT NULL,
            object_key TEXT NOT NULL,
            received_at TIMESTAMPTZ NOT NULL,
            document JSONB NOT NULL,
            stored_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS {collection}_received_at_idx ON {collection} (received_at);"
    )
}

fn dead_letter_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {DEAD_LETTER_TABLE} (
            id BIGSERIAL PRIMARY KEY,
            subject TEXT NOT NULL,
            kind TEXT,
            error TEXT NOT NULL,
            raw JSONB NOT NULL,
            received_at TIMESTAMPTZ NOT NULL,
            quarantined_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        ALTER TABLE {DEAD_LETTER_TABLE} ADD COLUMN IF NOT EXISTS kind TEXT;
        CREATE INDEX IF NOT EXISTS {DEAD_LETTER_TABLE}_subject_idx ON {DEAD_LETTER_TABLE} (subject);
        CREATE INDEX IF NOT EXISTS {DEAD_LETTER_TABLE}_kind_idx ON {DEAD_LETTER_TABLE} (kind);"
    )
}
