mod config;

use common::domain::STREAMS;
use common::nats::NatsClient;
use common::postgres::{
    ensure_schema, PostgresClient, PostgresDeadLetterRepository, PostgresMetadataRepository,
};
use common::s3::{S3Config, S3RawObjectStore};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use ingestion_worker::domain::{FernetRedactor, IngestionService, Normalizer, RedactorKey};
use ingestion_worker::ingestion_worker::{IngestionWorker, IngestionWorkerConfig};
use lake_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use telemetry_codec::SchemaRegistry;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "starting lake-all-in-one service"
    );
    debug!("configuration: {:?}", config);

    let dependencies = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("failed to initialize shared dependencies: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let ingestion = match build_ingestion_service(&config, &dependencies) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("failed to initialize ingestion service: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let worker = match IngestionWorker::new(
        dependencies.nats.create_consumer_client(),
        ingestion,
        IngestionWorkerConfig {
            batch_size: config.nats_batch_size,
            batch_wait: Duration::from_secs(config.nats_batch_wait_secs),
            ack_wait: Duration::from_secs(config.nats_ack_wait_secs),
            max_fetch_failures: config.nats_max_fetch_failures,
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("failed to initialize ingestion worker: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new()
        .with_shutdown_grace(Duration::from_secs(config.shutdown_grace_secs))
        .with_closer_timeout(Duration::from_secs(10));

    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    let SharedDependencies {
        nats, postgres, ..
    } = dependencies;

    runner = runner.with_closer(move || async move {
        info!("running cleanup tasks");

        if let Err(e) = nats.close().await {
            error!("failed to flush NATS connection: {:#}", e);
        }
        postgres.close();

        shutdown_telemetry(telemetry_providers);
        Ok(())
    });

    runner.run().await;
}

struct SharedDependencies {
    registry: Arc<SchemaRegistry>,
    postgres: PostgresClient,
    raw_objects: Arc<S3RawObjectStore>,
    nats: Arc<NatsClient>,
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<SharedDependencies> {
    let registry = Arc::new(load_schema_registry(config)?);

    info!("initializing metadata store...");
    let postgres = PostgresClient::new(
        &config.metadata_store_url,
        config.metadata_store_max_connections,
    )?;
    tokio::time::timeout(startup_timeout(config), postgres.ping())
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to the metadata store"))??;
    ensure_schema(&postgres).await?;

    info!("initializing raw object store...");
    let raw_objects = S3RawObjectStore::new(S3Config {
        bucket: config.object_store_bucket.clone(),
        region: config.object_store_region.clone(),
        endpoint: Some(config.object_store_endpoint.clone()),
        access_key_id: Some(config.object_store_access_key.clone()),
        secret_access_key: Some(config.object_store_secret_key.clone()),
    })
    .await;
    tokio::time::timeout(startup_timeout(config), raw_objects.ensure_bucket())
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to the raw object store"))??;

    info!("initializing NATS...");
    let nats = NatsClient::connect(&config.nats_url, startup_timeout(config)).await?;
    if config.ensure_streams {
        nats.ensure_streams(&STREAMS).await?;
    }

    Ok(SharedDependencies {
        registry,
        postgres,
        raw_objects: Arc::new(raw_objects),
        nats: Arc::new(nats),
    })
}

fn load_schema_registry(config: &ServiceConfig) -> anyhow::Result<SchemaRegistry> {
    let registry = match &config.schema_dir {
        Some(dir) => {
            info!(schema_dir = %dir, "loading schema descriptors from directory");
            SchemaRegistry::from_dir(dir)?
        }
        None => {
            info!("loading embedded schema descriptors");
            SchemaRegistry::embedded()?
        }
    };
    Ok(registry)
}

/// The redactor key is generated here and never stored: redacted values written by an
/// earlier run cannot be revealed by this one.
fn build_ingestion_service(
    config: &ServiceConfig,
    dependencies: &SharedDependencies,
) -> anyhow::Result<IngestionService> {
    let redactor = FernetRedactor::new(&RedactorKey::generate(), config.redactor_cache_capacity)?;

    Ok(IngestionService::new(
        Normalizer::new(dependencies.registry.clone(), Arc::new(redactor)),
        dependencies.raw_objects.clone(),
        Arc::new(PostgresMetadataRepository::new(dependencies.postgres.clone())),
        Arc::new(PostgresDeadLetterRepository::new(
            dependencies.postgres.clone(),
        )),
    ))
}

fn startup_timeout(config: &ServiceConfig) -> Duration {
    Duration::from_secs(config.startup_timeout_secs)
}
