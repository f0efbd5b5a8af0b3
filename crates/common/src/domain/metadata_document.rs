use crate::domain::{ObjectKey, RawEvent};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const RAW_PAYLOAD_LEN_FIELD: &str = "_raw_payload_len";

/// Queryable copy of a delivered event: the input fields minus PII plaintext,
/// plus the encoded payload length, linked to the raw object it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    pub subject: String,
    pub object_key: ObjectKey,
    pub received_at: DateTime<Utc>,
    pub document: Map<String, Value>,
}

impl MetadataDocument {
    pub fn new<'a>(
        event: &RawEvent,
        pii_fields: impl IntoIterator<Item = &'a str>,
        object_key: ObjectKey,
        payload_len: usize,
    ) -> Self {
        let mut document = event.fields.clone();
        for field in pii_fields {
            document.remove(field);
        }
        document.insert(
            RAW_PAYLOAD_LEN_FIELD.to_string(),
            Value::from(payload_len as u64),
        );

        Self {
            subject: event.subject.clone(),
            object_key,
            received_at: event.received_at,
            document,
        }
    }
}
