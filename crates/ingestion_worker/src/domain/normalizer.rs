use crate::domain::Redactor;
use common::domain::{json_type_name, ChannelKind, IngestError, IngestResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use telemetry_codec::{
    FieldDescriptor, FieldType, FieldValue, NormalizedRecord, SchemaDescriptor, SchemaId,
    SchemaRegistry,
};

/// Input keys whose presence selects the v2 wearable layout.
const WEARABLE_V2_MARKERS: [&str; 2] = ["hrv_ms", "skin_temp_c"];

/// Maps loosely-typed event fields onto the exact layout of a schema.
///
/// Normalization is all-or-nothing: either every descriptor field is present and
/// correctly typed in the result, or the first offending field is reported.
pub struct Normalizer {
    registry: Arc<SchemaRegistry>,
    redactor: Arc<dyn Redactor>,
}

impl Normalizer {
    pub fn new(registry: Arc<SchemaRegistry>, redactor: Arc<dyn Redactor>) -> Self {
        Self { registry, redactor }
    }

    /// Layout an event of `kind` is normalized into. Wearable is the only kind
    /// whose layout depends on the event itself.
    pub fn select_schema(kind: ChannelKind, fields: &Map<String, Value>) -> SchemaId {
        match kind {
            ChannelKind::CameraRecognition => SchemaId::CameraRecognition,
            ChannelKind::AccessControl => SchemaId::AccessControl,
            ChannelKind::BuildingMetric => SchemaId::BuildingMetric,
            ChannelKind::AirQuality => SchemaId::AirQuality,
            ChannelKind::Wearable => {
                if WEARABLE_V2_MARKERS.iter().any(|key| fields.contains_key(*key)) {
                    SchemaId::WearableV2
                } else {
                    SchemaId::WearableV1
                }
            }
            ChannelKind::NetworkLog => SchemaId::NetworkLog,
        }
    }

    /// Returns the chosen descriptor alongside the record so the encoder uses the same layout.
    pub fn normalize(
        &self,
        kind: ChannelKind,
        fields: &Map<String, Value>,
    ) -> IngestResult<(&SchemaDescriptor, NormalizedRecord)> {
        let schema_id = Self::select_schema(kind, fields);
        let schema = self
            .registry
            .describe(schema_id)
            .map_err(|_| IngestError::UnknownKind(schema_id.to_string()))?;

        let values = schema
            .fields()
            .iter()
            .map(|field| -> IngestResult<(String, FieldValue)> {
                Ok((field.name.clone(), self.normalize_field(field, fields)?))
            })
            .collect::<IngestResult<Vec<_>>>()?;

        Ok((schema, NormalizedRecord::new(schema_id, values)))
    }

    fn normalize_field(
        &self,
        field: &FieldDescriptor,
        fields: &Map<String, Value>,
    ) -> IngestResult<FieldValue> {
        let source = field.source_name();

        let value = match fields.get(source) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if field.is_pii() && s.is_empty() => None,
            Some(value) => Some(value),
        };

        let Some(value) = value else {
            return if field.nullable {
                Ok(FieldValue::Null)
            } else {
                Err(IngestError::MissingField(source.to_string()))
            };
        };

        if field.is_pii() {
            return match value {
                Value::String(plaintext) => Ok(FieldValue::String(self.redactor.redact(plaintext))),
                other => Err(type_mismatch(field, other)),
            };
        }

        let coerced = coerce(&field.field_type, value).ok_or_else(|| type_mismatch(field, value))?;

        if let Some(number) = numeric_value(&coerced) {
            if !field.within_bounds(number) {
                return Err(IngestError::TypeMismatch {
                    field: source.to_string(),
                    expected: bounds_description(field),
                    found: describe(value),
                });
            }
        }

        Ok(coerced)
    }
}

fn coerce(field_type: &FieldType, value: &Value) -> Option<FieldValue> {
    match field_type {
        FieldType::Int => as_integer(value)
            .and_then(|n| i32::try_from(n).ok())
            .map(FieldValue::Int),
        FieldType::Long => as_integer(value).map(FieldValue::Long),
        FieldType::Double => as_double(value).map(FieldValue::Double),
        FieldType::String => value.as_str().map(|s| FieldValue::String(s.to_string())),
        FieldType::Enum { symbols } => value
            .as_str()
            .filter(|s| symbols.iter().any(|symbol| symbol == s))
            .map(|s| FieldValue::Enum(s.to_string())),
    }
}

/// Integers as-is, finite floats truncated toward zero, and integer strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_double(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn numeric_value(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Int(n) => Some(f64::from(*n)),
        FieldValue::Long(n) => Some(*n as f64),
        FieldValue::Double(n) => Some(*n),
        _ => None,
    }
}

fn type_mismatch(field: &FieldDescriptor, found: &Value) -> IngestError {
    let expected = match &field.field_type {
        FieldType::Enum { symbols } => format!("one of {}", symbols.join("|")),
        other => other.name().to_string(),
    };

    IngestError::TypeMismatch {
        field: field.source_name().to_string(),
        expected,
        found: describe(found),
    }
}

fn bounds_description(field: &FieldDescriptor) -> String {
    let type_name = field.field_type.name();
    match (field.minimum, field.maximum) {
        (Some(min), Some(max)) => format!("{type_name} in [{min}, {max}]"),
        (Some(min), None) => format!("{type_name} >= {min}"),
        (None, Some(max)) => format!("{type_name} <= {max}"),
        (None, None) => type_name.to_string(),
    }
}

/// e.g. `string "abc"`, `number 1.5`, `array`.
fn describe(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            format!("{} {}", json_type_name(value), value)
        }
        other => json_type_name(other).to_string(),
    }
}
