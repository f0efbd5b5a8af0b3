use crate::{CodecError, Result};
use apache_avro::Schema;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Closed set of record layouts the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaId {
    CameraRecognition,
    AccessControl,
    BuildingMetric,
    AirQuality,
    WearableV1,
    WearableV2,
    NetworkLog,
}

impl SchemaId {
    pub const ALL: [SchemaId; 7] = [
        SchemaId::CameraRecognition,
        SchemaId::AccessControl,
        SchemaId::BuildingMetric,
        SchemaId::AirQuality,
        SchemaId::WearableV1,
        SchemaId::WearableV2,
        SchemaId::NetworkLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaId::CameraRecognition => "camera-recognition",
            SchemaId::AccessControl => "access-control",
            SchemaId::BuildingMetric => "building-metric",
            SchemaId::AirQuality => "air-quality",
            SchemaId::WearableV1 => "wearable-v1",
            SchemaId::WearableV2 => "wearable-v2",
            SchemaId::NetworkLog => "network-log",
        }
    }

    /// Descriptor file name used both for the embedded set and `schema_dir` overrides.
    pub fn file_name(&self) -> &'static str {
        match self {
            SchemaId::CameraRecognition => "camera_recognition.avsc",
            SchemaId::AccessControl => "access_control.avsc",
            SchemaId::BuildingMetric => "building_metric.avsc",
            SchemaId::AirQuality => "air_quality.avsc",
            SchemaId::WearableV1 => "wearable_v1.avsc",
            SchemaId::WearableV2 => "wearable_v2.avsc",
            SchemaId::NetworkLog => "network_log.avsc",
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Int,
    Long,
    Double,
    String,
    Enum { symbols: Vec<String> },
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Enum { .. } => "enum",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Long | FieldType::Double)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Input field whose plaintext is redacted into this field.
    pub pii_source: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl FieldDescriptor {
    pub fn is_pii(&self) -> bool {
        self.pii_source.is_some()
    }

    /// Input key this field is read from.
    pub fn source_name(&self) -> &str {
        self.pii_source.as_deref().unwrap_or(&self.name)
    }

    pub fn within_bounds(&self, value: f64) -> bool {
        self.minimum.map_or(true, |min| value >= min)
            && self.maximum.map_or(true, |max| value <= max)
    }
}

/// Ordered field layout for one [`SchemaId`], paired with the parsed Avro schema.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    id: SchemaId,
    fields: Vec<FieldDescriptor>,
    avro: Schema,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(rename = "type")]
    record_type: String,
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: Value,
    #[serde(default)]
    pii_source: Option<String>,
    #[serde(default)]
    minimum: Option<f64>,
    #[serde(default)]
    maximum: Option<f64>,
}

impl SchemaDescriptor {
    /// Parse an `.avsc` document carrying the `pii_source` / `minimum` / `maximum` extensions.
    pub fn parse(id: SchemaId, source: &str) -> Result<Self> {
        let invalid = |reason: String| CodecError::InvalidDescriptor { schema: id, reason };

        let avro = Schema::parse_str(source).map_err(|e| invalid(e.to_string()))?;
        let raw: RawDescriptor =
            serde_json::from_str(source).map_err(|e| invalid(e.to_string()))?;

        if raw.record_type != "record" {
            return Err(invalid(format!(
                "top-level type must be record, got {}",
                raw.record_type
            )));
        }
        if raw.fields.is_empty() {
            return Err(invalid("record declares no fields".to_string()));
        }

        let fields = raw
            .fields
            .into_iter()
            .map(|field| parse_field(field).map_err(&invalid))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id, fields, avro })
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Input keys holding plaintext PII for this layout.
    pub fn pii_sources(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| f.pii_source.as_deref())
    }

    pub fn avro_schema(&self) -> &Schema {
        &self.avro
    }
}

fn parse_field(raw: RawField) -> std::result::Result<FieldDescriptor, String> {
    let (field_type, nullable) = match &raw.field_type {
        Value::Array(branches) => match branches.as_slice() {
            [Value::String(null), inner] if null == "null" => {
                (parse_type(&raw.name, inner)?, true)
            }
            _ => {
                return Err(format!(
                    "field {}: only [\"null\", T] unions are supported",
                    raw.name
                ))
            }
        },
        other => (parse_type(&raw.name, other)?, false),
    };

    if raw.pii_source.is_some() && field_type != FieldType::String {
        return Err(format!("field {}: pii fields must be strings", raw.name));
    }
    if (raw.minimum.is_some() || raw.maximum.is_some()) && !field_type.is_numeric() {
        return Err(format!("field {}: bounds on a non-numeric field", raw.name));
    }

    Ok(FieldDescriptor {
        name: raw.name,
        field_type,
        nullable,
        pii_source: raw.pii_source,
        minimum: raw.minimum,
        maximum: raw.maximum,
    })
}

fn parse_type(field: &str, value: &Value) -> std::result::Result<FieldType, String> {
    match value {
        Value::String(primitive) => match primitive.as_str() {
            "int" => Ok(FieldType::Int),
            "long" => Ok(FieldType::Long),
            "double" => Ok(FieldType::Double),
            "string" => Ok(FieldType::String),
            other => Err(format!("field {field}: unsupported type {other}")),
        },
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("enum") => {
            let symbols = map
                .get("symbols")
                .and_then(Value::as_array)
                .ok_or_else(|| format!("field {field}: enum without symbols"))?
                .iter()
                .map(|s| {
                    s.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| format!("field {field}: enum symbol is not a string"))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(FieldType::Enum { symbols })
        }
        _ => Err(format!("field {field}: unsupported type declaration")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "record",
        "name": "Sample",
        "fields": [
            { "name": "ts", "type": "long" },
            { "name": "email_ref", "type": "string", "pii_source": "email" },
            { "name": "score", "type": "double", "minimum": 0.0, "maximum": 1.0 },
            { "name": "state", "type": { "type": "enum", "name": "State", "symbols": ["ON", "OFF"] } },
            { "name": "extra", "type": ["null", "int"], "default": null }
        ]
    }"#;

    #[test]
    fn test_parse_keeps_field_order_and_extensions() {
        let descriptor = SchemaDescriptor::parse(SchemaId::CameraRecognition, SAMPLE).unwrap();

        let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ts", "email_ref", "score", "state", "extra"]);

        let email = descriptor.field("email_ref").unwrap();
        assert!(email.is_pii());
        assert_eq!(email.source_name(), "email");

        let score = descriptor.field("score").unwrap();
        assert!(score.within_bounds(0.5));
        assert!(!score.within_bounds(1.5));

        let extra = descriptor.field("extra").unwrap();
        assert!(extra.nullable);
        assert_eq!(extra.field_type, FieldType::Int);

        assert_eq!(
            descriptor.field("state").unwrap().field_type,
            FieldType::Enum {
                symbols: vec!["ON".to_string(), "OFF".to_string()]
            }
        );
        assert_eq!(descriptor.pii_sources().collect::<Vec<_>>(), vec!["email"]);
    }

    #[test]
    fn test_parse_rejects_pii_on_numeric_field() {
        let source = r#"{
            "type": "record",
            "name": "Bad",
            "fields": [{ "name": "ts", "type": "long", "pii_source": "email" }]
        }"#;

        let result = SchemaDescriptor::parse(SchemaId::AirQuality, source);
        assert!(matches!(
            result,
            Err(CodecError::InvalidDescriptor {
                schema: SchemaId::AirQuality,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_rejects_null_second_union() {
        let source = r#"{
            "type": "record",
            "name": "Bad",
            "fields": [{ "name": "hr", "type": ["int", "null"] }]
        }"#;

        assert!(SchemaDescriptor::parse(SchemaId::WearableV2, source).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(SchemaDescriptor::parse(SchemaId::NetworkLog, "{ not json").is_err());
    }
}
