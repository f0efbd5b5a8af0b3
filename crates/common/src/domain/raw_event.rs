use crate::domain::{IngestError, IngestResult};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A delivered message decoded into a loosely-typed field map. Lives for one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl RawEvent {
    /// Decode a wire payload. Anything but a JSON object is `InvalidPayload`.
    pub fn from_payload(
        subject: &str,
        received_at: DateTime<Utc>,
        payload: &[u8],
    ) -> IngestResult<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| IngestError::InvalidPayload(e.to_string()))?;

        match value {
            Value::Object(fields) => Ok(Self {
                subject: subject.to_string(),
                received_at,
                fields,
            }),
            other => Err(IngestError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Name of a JSON value's type, as used in `TypeMismatch` reasons.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
