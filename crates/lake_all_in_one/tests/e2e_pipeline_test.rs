#![cfg(feature = "integration-tests")]

use anyhow::Result;
use common::domain::{ObjectKey, STREAMS};
use common::nats::NatsClient;
use common::postgres::{
    ensure_schema, PostgresClient, PostgresDeadLetterRepository, PostgresMetadataRepository,
};
use common::s3::{S3Config, S3RawObjectStore};
use ingestion_worker::domain::{FernetRedactor, IngestionService, Normalizer, RedactorKey};
use ingestion_worker::ingestion_worker::{IngestionWorker, IngestionWorkerConfig};
use lake_runner::Runner;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use telemetry_codec::{FieldValue, SchemaId, SchemaRegistry};
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use testcontainers_modules::minio::MinIO;
use testcontainers_modules::postgres::Postgres;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// NATS with JetStream enabled
#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

struct Pipeline {
    _postgres: ContainerAsync<Postgres>,
    _minio: ContainerAsync<MinIO>,
    _nats: ContainerAsync<NatsWithJetStream>,
    pg_client: PostgresClient,
    raw_objects: Arc<S3RawObjectStore>,
    nats_client: Arc<NatsClient>,
    registry: Arc<SchemaRegistry>,
}

async fn start_pipeline() -> Result<Pipeline> {
    let (postgres, minio, nats) = tokio::join!(
        Postgres::default().start(),
        MinIO::default().start(),
        NatsWithJetStream::default().start()
    );
    let postgres = postgres?;
    let minio = minio?;
    let nats = nats?;

    let pg_host = postgres.get_host().await?;
    let pg_port = postgres.get_host_port_ipv4(5432).await?;
    let pg_client = PostgresClient::new(
        &format!("postgres://postgres:postgres@{pg_host}:{pg_port}/postgres"),
        5,
    )?;
    pg_client.ping().await?;
    ensure_schema(&pg_client).await?;

    let minio_host = minio.get_host().await?;
    let minio_port = minio.get_host_port_ipv4(9000).await?;
    let raw_objects = S3RawObjectStore::new(S3Config {
        bucket: "raw".to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some(format!("http://{minio_host}:{minio_port}")),
        access_key_id: Some("minioadmin".to_string()),
        secret_access_key: Some("minioadmin".to_string()),
    })
    .await;
    raw_objects.ensure_bucket().await?;

    let nats_host = nats.get_host().await?;
    let nats_port = nats.get_host_port_ipv4(4222).await?;
    let nats_client =
        NatsClient::connect(&format!("nats://{nats_host}:{nats_port}"), Duration::from_secs(30))
            .await?;
    nats_client.ensure_streams(&STREAMS).await?;

    Ok(Pipeline {
        _postgres: postgres,
        _minio: minio,
        _nats: nats,
        pg_client,
        raw_objects: Arc::new(raw_objects),
        nats_client: Arc::new(nats_client),
        registry: Arc::new(SchemaRegistry::embedded()?),
    })
}

async fn publish(nats_client: &NatsClient, subject: &str, payload: &'static str) -> Result<()> {
    nats_client
        .jetstream()
        .publish(subject.to_string(), payload.into())
        .await?
        .await?;
    Ok(())
}

async fn run_worker_for(pipeline: &Pipeline, duration: Duration) -> Result<()> {
    let redactor = FernetRedactor::new(&RedactorKey::generate(), 1_000)?;
    let ingestion = Arc::new(IngestionService::new(
        Normalizer::new(pipeline.registry.clone(), Arc::new(redactor)),
        pipeline.raw_objects.clone(),
        Arc::new(PostgresMetadataRepository::new(pipeline.pg_client.clone())),
        Arc::new(PostgresDeadLetterRepository::new(
            pipeline.pg_client.clone(),
        )),
    ));

    let worker = IngestionWorker::new(
        pipeline.nats_client.create_consumer_client(),
        ingestion,
        IngestionWorkerConfig {
            batch_size: 10,
            batch_wait: Duration::from_millis(500),
            ack_wait: Duration::from_secs(30),
            max_fetch_failures: 5,
        },
    )
    .await?;

    let token = CancellationToken::new();
    let mut runner = Runner::new()
        .with_shutdown_grace(Duration::from_secs(5))
        .with_cancellation_token(token.clone());
    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    tokio::spawn(async move {
        sleep(duration).await;
        token.cancel();
    });

    runner.execute().await
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_pipeline_persists_valid_and_quarantines_invalid_events() -> Result<()> {
    // Arrange
    let pipeline = start_pipeline().await?;

    publish(
        &pipeline.nats_client,
        "bms.ac",
        r#"{"device_id":"ac-3","ts":1700000000000,"metric":"TEMP","value":24.1}"#,
    )
    .await?;
    publish(
        &pipeline.nats_client,
        "fr.camera",
        r#"{"device_id":"cam-1","ts":1700000000000,"email":"a@b.io","location":"lobby"}"#,
    )
    .await?;
    publish(
        &pipeline.nats_client,
        "oura",
        r#"{"user_id":"u-1","ts":1700000000000,"email":"u1@example.com","hr":61,"steps":4000,"hrv_ms":48}"#,
    )
    .await?;

    // Act
    run_worker_for(&pipeline, Duration::from_secs(5)).await?;

    // Assert
    let conn = pipeline.pg_client.get_connection().await?;

    let row = conn
        .query_one("SELECT object_key, document FROM building_metric", &[])
        .await?;
    let object_key: String = row.get(0);
    let document: Value = row.get(1);
    assert!(object_key.starts_with("building-metric/ac/"));
    assert_eq!(document["device_id"], "ac-3");

    let encoded = pipeline
        .raw_objects
        .get_raw(&ObjectKey::from(object_key.clone()))
        .await?;
    let decoded = telemetry_codec::decode(
        &encoded,
        pipeline.registry.describe(SchemaId::BuildingMetric)?,
    )?;
    assert_eq!(decoded.get("value"), Some(&FieldValue::Double(24.1)));
    assert_eq!(document["_raw_payload_len"], encoded.len());

    let wearable = conn.query_one("SELECT document FROM wearable", &[]).await?;
    let wearable_document: Value = wearable.get(0);
    assert!(wearable_document.get("email").is_none());
    assert_eq!(wearable_document["hrv_ms"], 48);

    let camera_rows = conn
        .query("SELECT 1 FROM camera_recognition", &[])
        .await?;
    assert!(camera_rows.is_empty());

    let dead_letter = conn
        .query_one("SELECT subject, kind, error FROM dead_letter", &[])
        .await?;
    let subject: String = dead_letter.get(0);
    let kind: Option<String> = dead_letter.get(1);
    let error: String = dead_letter.get(2);
    assert_eq!(subject, "fr.camera");
    assert_eq!(kind.as_deref(), Some("camera-recognition"));
    assert_eq!(error, "MissingField: confidence");

    Ok(())
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_acknowledged_deliveries_are_not_redelivered_after_restart() -> Result<()> {
    let pipeline = start_pipeline().await?;

    publish(&pipeline.nats_client, "netlog", "not json").await?;
    publish(
        &pipeline.nats_client,
        "iaq",
        r#"{"device_id":"iaq-1","ts":1700000000000,"co2_ppm":640,"pm25":8.5,"temp_c":21.5}"#,
    )
    .await?;

    run_worker_for(&pipeline, Duration::from_secs(4)).await?;
    run_worker_for(&pipeline, Duration::from_secs(4)).await?;

    let conn = pipeline.pg_client.get_connection().await?;
    let air_quality: i64 = conn
        .query_one("SELECT count(*) FROM air_quality", &[])
        .await?
        .get(0);
    let dead_letters: i64 = conn
        .query_one("SELECT count(*) FROM dead_letter", &[])
        .await?
        .get(0);
    assert_eq!(air_quality, 1);
    assert_eq!(dead_letters, 1);

    let raw: Value = conn
        .query_one("SELECT raw FROM dead_letter", &[])
        .await?
        .get(0);
    assert_eq!(raw, Value::String("not json".to_string()));

    Ok(())
}
