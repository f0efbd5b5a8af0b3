use crate::domain::Normalizer;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::domain::{
    Channel, DeadLetterRecord, DeadLetterSink, IngestError, MetadataDocument, MetadataSink,
    ObjectKey, RawEvent, RawObjectSink,
};
use common::nats::DeliveryOutcome;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Where in the pipeline a delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    Received,
    Normalizing,
    Encoding,
    Persisting,
}

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::Received => "received",
            DeliveryStage::Normalizing => "normalizing",
            DeliveryStage::Encoding => "encoding",
            DeliveryStage::Persisting => "persisting",
        }
    }
}

#[derive(Debug)]
struct StageFailure {
    stage: DeliveryStage,
    error: IngestError,
}

impl StageFailure {
    fn at(stage: DeliveryStage) -> impl FnOnce(IngestError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Takes one delivery from payload bytes to a terminal outcome.
///
/// Flow:
/// 1. Resolve the channel from the subject and decode the JSON payload
/// 2. Normalize against the channel's schema, redacting PII
/// 3. Encode to Avro
/// 4. Write the raw object, then the metadata document carrying its key
///
/// Any failure is quarantined to the dead-letter sink. Nothing is retried here;
/// broker redelivery is the only retry.
pub struct IngestionService {
    normalizer: Normalizer,
    raw_sink: Arc<dyn RawObjectSink>,
    metadata_sink: Arc<dyn MetadataSink>,
    dead_letter_sink: Arc<dyn DeadLetterSink>,
}

impl IngestionService {
    pub fn new(
        normalizer: Normalizer,
        raw_sink: Arc<dyn RawObjectSink>,
        metadata_sink: Arc<dyn MetadataSink>,
        dead_letter_sink: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            normalizer,
            raw_sink,
            metadata_sink,
            dead_letter_sink,
        }
    }

    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn ingest(
        &self,
        subject: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> DeliveryOutcome {
        match self.persist(subject, payload, received_at).await {
            Ok((object_key, payload_len)) => {
                debug!(object_key = %object_key, payload_len, "delivery persisted");
                DeliveryOutcome::Persisted {
                    object_key,
                    payload_len,
                }
            }
            Err(failure) => self.quarantine(subject, payload, received_at, failure).await,
        }
    }

    async fn persist(
        &self,
        subject: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<(ObjectKey, usize), StageFailure> {
        let channel =
            Channel::from_subject(subject).map_err(StageFailure::at(DeliveryStage::Received))?;
        let event = RawEvent::from_payload(subject, received_at, payload)
            .map_err(StageFailure::at(DeliveryStage::Received))?;

        let (schema, record) = self
            .normalizer
            .normalize(channel.kind, &event.fields)
            .map_err(StageFailure::at(DeliveryStage::Normalizing))?;

        let encoded = telemetry_codec::encode(&record, schema)
            .map_err(|e| IngestError::Encoding(e.to_string()))
            .map_err(StageFailure::at(DeliveryStage::Encoding))?;
        let payload_len = encoded.len();

        debug!(
            schema = %schema.id(),
            payload_len,
            "normalized and encoded delivery"
        );

        let object_key = self
            .raw_sink
            .put_raw(channel, received_at, Bytes::from(encoded))
            .await
            .map_err(StageFailure::at(DeliveryStage::Persisting))?;

        let document =
            MetadataDocument::new(&event, schema.pii_sources(), object_key.clone(), payload_len);
        self.metadata_sink
            .put_metadata(channel, &document)
            .await
            .map_err(StageFailure::at(DeliveryStage::Persisting))?;

        Ok((object_key, payload_len))
    }

    async fn quarantine(
        &self,
        subject: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
        failure: StageFailure,
    ) -> DeliveryOutcome {
        let reason = failure.error.to_string();
        debug!(
            stage = failure.stage.as_str(),
            error_kind = failure.error.kind(),
            reason = %reason,
            "quarantining delivery"
        );

        let record = DeadLetterRecord::new(subject, &reason, dead_letter_raw(payload), received_at);

        match self.dead_letter_sink.quarantine(&record).await {
            Ok(()) => DeliveryOutcome::Quarantined { reason },
            Err(e) => {
                error!(
                    reason = %reason,
                    error = %e,
                    "dead-letter write failed, delivery will be acknowledged and lost"
                );
                DeliveryOutcome::Lost {
                    reason,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// The payload as JSON when it parses, otherwise its lossily-decoded text.
fn dead_letter_raw(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FernetRedactor, RedactorKey};
    use chrono::TimeZone;
    use common::domain::{ChannelKind, MockDeadLetterSink, MockMetadataSink, MockRawObjectSink};
    use serde_json::json;
    use std::sync::Mutex;
    use telemetry_codec::{FieldValue, SchemaId, SchemaRegistry};

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::embedded().unwrap())
    }

    fn service(
        raw_sink: MockRawObjectSink,
        metadata_sink: MockMetadataSink,
        dead_letter_sink: MockDeadLetterSink,
    ) -> IngestionService {
        let redactor = FernetRedactor::new(&RedactorKey::generate(), 100).unwrap();
        IngestionService::new(
            Normalizer::new(registry(), Arc::new(redactor)),
            Arc::new(raw_sink),
            Arc::new(metadata_sink),
            Arc::new(dead_letter_sink),
        )
    }

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn accepting_raw_sink(captured: Arc<Mutex<Vec<Bytes>>>) -> MockRawObjectSink {
        let mut raw_sink = MockRawObjectSink::new();
        raw_sink
            .expect_put_raw()
            .returning(move |channel, received_at, payload| {
                captured.lock().unwrap().push(payload);
                Ok(ObjectKey::derive(channel, received_at))
            });
        raw_sink
    }

    #[tokio::test]
    async fn test_ingest_building_metric_persists_both_halves() {
        // Arrange
        let encoded = Arc::new(Mutex::new(Vec::new()));
        let raw_sink = accepting_raw_sink(encoded.clone());

        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink
            .expect_put_metadata()
            .withf(|channel: &Channel, document: &MetadataDocument| {
                channel.collection == "building_metric"
                    && document.object_key.as_str()
                        == "building-metric/ac/2023/11/14/22/13/1700000000000.bin"
                    && document.document.get("device_id") == Some(&json!("ac-3"))
                    && document.document.contains_key("_raw_payload_len")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink.expect_quarantine().times(0);

        let service = service(raw_sink, metadata_sink, dead_letter_sink);
        let payload = br#"{"device_id":"ac-3","ts":1700000000000,"metric":"TEMP","value":24.1}"#;

        // Act
        let outcome = service
            .ingest("bms.ac", payload, at_millis(1_700_000_000_000))
            .await;

        // Assert
        let DeliveryOutcome::Persisted {
            object_key,
            payload_len,
        } = outcome
        else {
            panic!("expected persisted outcome");
        };
        assert_eq!(
            object_key.as_str(),
            "building-metric/ac/2023/11/14/22/13/1700000000000.bin"
        );

        let encoded = encoded.lock().unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].len(), payload_len);

        let registry = registry();
        let schema = registry.describe(SchemaId::BuildingMetric).unwrap();
        let decoded = telemetry_codec::decode(&encoded[0], schema).unwrap();
        assert_eq!(
            decoded.get("device_id"),
            Some(&FieldValue::String("ac-3".to_string()))
        );
        assert_eq!(decoded.get("ts"), Some(&FieldValue::Long(1_700_000_000_000)));
        assert_eq!(decoded.get("metric"), Some(&FieldValue::Enum("TEMP".to_string())));
        assert_eq!(decoded.get("value"), Some(&FieldValue::Double(24.1)));
    }

    #[tokio::test]
    async fn test_ingest_missing_field_is_quarantined_without_sink_writes() {
        // Arrange
        let mut raw_sink = MockRawObjectSink::new();
        raw_sink.expect_put_raw().times(0);
        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink.expect_put_metadata().times(0);

        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink
            .expect_quarantine()
            .withf(|record: &DeadLetterRecord| {
                record.subject == "fr.camera"
                    && record.kind == Some(ChannelKind::CameraRecognition)
                    && record.error == "MissingField: confidence"
                    && record.raw.get("device_id") == Some(&json!("cam-1"))
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(raw_sink, metadata_sink, dead_letter_sink);
        let payload = br#"{"device_id":"cam-1","ts":1700000000000,"email":"a@b.io","location":"lobby"}"#;

        // Act
        let outcome = service.ingest("fr.camera", payload, Utc::now()).await;

        // Assert
        assert_eq!(
            outcome,
            DeliveryOutcome::Quarantined {
                reason: "MissingField: confidence".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_unknown_subject_is_quarantined() {
        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink
            .expect_quarantine()
            .withf(|record: &DeadLetterRecord| {
                record.error == "UnknownKind: bms.elevator" && record.kind.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            MockRawObjectSink::new(),
            MockMetadataSink::new(),
            dead_letter_sink,
        );

        let outcome = service
            .ingest("bms.elevator", br#"{"device_id":"el-1"}"#, Utc::now())
            .await;

        assert_eq!(outcome.label(), "quarantined");
    }

    #[tokio::test]
    async fn test_ingest_non_json_payload_keeps_text_in_dead_letter() {
        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink
            .expect_quarantine()
            .withf(|record: &DeadLetterRecord| {
                record.error.starts_with("InvalidPayload:")
                    && record.raw == json!("not json at all")
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            MockRawObjectSink::new(),
            MockMetadataSink::new(),
            dead_letter_sink,
        );

        let outcome = service.ingest("iaq", b"not json at all", Utc::now()).await;

        assert_eq!(outcome.label(), "quarantined");
    }

    #[tokio::test]
    async fn test_ingest_raw_sink_failure_skips_metadata_and_quarantines() {
        // Arrange
        let mut raw_sink = MockRawObjectSink::new();
        raw_sink.expect_put_raw().times(1).returning(|_, _, _| {
            Err(IngestError::sink_unavailable(
                "raw_object",
                anyhow::anyhow!("connection refused"),
            ))
        });
        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink.expect_put_metadata().times(0);

        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink
            .expect_quarantine()
            .withf(|record: &DeadLetterRecord| {
                record.error == "SinkUnavailable: raw_object: connection refused"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(raw_sink, metadata_sink, dead_letter_sink);
        let payload = br#"{"device_id":"iaq-1","ts":1700000000000,"co2_ppm":640,"pm25":8.5,"temp_c":21.5}"#;

        // Act
        let outcome = service.ingest("iaq", payload, Utc::now()).await;

        // Assert
        assert_eq!(outcome.label(), "quarantined");
    }

    #[tokio::test]
    async fn test_ingest_metadata_failure_is_quarantined() {
        let raw_sink = accepting_raw_sink(Arc::new(Mutex::new(Vec::new())));
        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink.expect_put_metadata().times(1).returning(|_, _| {
            Err(IngestError::sink_unavailable(
                "metadata",
                anyhow::anyhow!("pool timed out"),
            ))
        });

        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink
            .expect_quarantine()
            .withf(|record: &DeadLetterRecord| {
                record.error == "SinkUnavailable: metadata: pool timed out"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(raw_sink, metadata_sink, dead_letter_sink);
        let payload = br#"{"device_id":"sw-1","ts":1700000000000,"bytes_in":10,"bytes_out":20,"status":"OK"}"#;

        let outcome = service.ingest("netlog", payload, Utc::now()).await;

        assert_eq!(outcome.label(), "quarantined");
    }

    #[tokio::test]
    async fn test_ingest_dead_letter_failure_is_lost() {
        let mut dead_letter_sink = MockDeadLetterSink::new();
        dead_letter_sink.expect_quarantine().times(1).returning(|_| {
            Err(IngestError::sink_unavailable(
                "dead_letter",
                anyhow::anyhow!("connection refused"),
            ))
        });

        let service = service(
            MockRawObjectSink::new(),
            MockMetadataSink::new(),
            dead_letter_sink,
        );

        let outcome = service.ingest("oura", br#"{"user_id":"u-1"}"#, Utc::now()).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Lost {
                reason: "MissingField: ts".to_string(),
                error: "SinkUnavailable: dead_letter: connection refused".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_redelivery_is_persisted_twice() {
        // Arrange
        let raw_sink = accepting_raw_sink(Arc::new(Mutex::new(Vec::new())));

        let documents = Arc::new(Mutex::new(Vec::new()));
        let captured = documents.clone();
        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink
            .expect_put_metadata()
            .times(2)
            .returning(move |_, document| {
                captured.lock().unwrap().push(document.clone());
                Ok(())
            });

        let service = service(raw_sink, metadata_sink, MockDeadLetterSink::new());
        let payload = br#"{"device_id":"ac-9","ts":1700000000000,"metric":"KW","value":3.2}"#;

        // Act
        let first = service
            .ingest("bms.pm", payload, at_millis(1_700_000_000_000))
            .await;
        let second = service
            .ingest("bms.pm", payload, at_millis(1_700_000_030_001))
            .await;

        // Assert
        assert!(first.is_persisted());
        assert!(second.is_persisted());
        assert_ne!(first, second);

        let documents = documents.lock().unwrap();
        assert_eq!(documents.len(), 2);
        assert_ne!(documents[0].object_key, documents[1].object_key);
        assert_eq!(documents[0].document, documents[1].document);
    }

    #[tokio::test]
    async fn test_metadata_document_omits_pii_plaintext() {
        let raw_sink = accepting_raw_sink(Arc::new(Mutex::new(Vec::new())));
        let mut metadata_sink = MockMetadataSink::new();
        metadata_sink
            .expect_put_metadata()
            .withf(|channel: &Channel, document: &MetadataDocument| {
                channel.collection == "wearable"
                    && !document.document.contains_key("email")
                    && document.document.get("hrv_ms") == Some(&json!(52))
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(raw_sink, metadata_sink, MockDeadLetterSink::new());
        let payload = br#"{"user_id":"u-7","ts":1700000000000,"email":"fay@example.com","hr":58,"steps":9000,"hrv_ms":52}"#;

        let outcome = service.ingest("oura", payload, Utc::now()).await;

        assert!(outcome.is_persisted());
    }

    #[test]
    fn test_dead_letter_raw_keeps_json_values() {
        assert_eq!(dead_letter_raw(b"[1,2]"), json!([1, 2]));
        assert_eq!(dead_letter_raw(b"\xff{"), json!("\u{fffd}{"));
    }
}
