use crate::{
    CodecError, FieldDescriptor, FieldType, FieldValue, NormalizedRecord, Result,
    SchemaDescriptor,
};
use apache_avro::types::Value;

/// Schemaless Avro datum encoding of `record` against `schema`.
///
/// The record must carry exactly the schema's fields in order; anything else is a
/// [`CodecError::SchemaMismatch`].
pub fn encode(record: &NormalizedRecord, schema: &SchemaDescriptor) -> Result<Vec<u8>> {
    let mismatch = |reason: String| CodecError::SchemaMismatch {
        schema: schema.id(),
        reason,
    };

    if record.schema() != schema.id() {
        return Err(mismatch(format!("record built for {}", record.schema())));
    }
    if record.len() != schema.fields().len() {
        return Err(mismatch(format!(
            "expected {} fields, got {}",
            schema.fields().len(),
            record.len()
        )));
    }

    let mut fields = Vec::with_capacity(record.len());
    for (descriptor, (name, value)) in schema.fields().iter().zip(record.fields()) {
        if descriptor.name != *name {
            return Err(mismatch(format!(
                "expected field {}, got {}",
                descriptor.name, name
            )));
        }
        fields.push((name.clone(), to_avro(descriptor, value).map_err(&mismatch)?));
    }

    apache_avro::to_avro_datum(schema.avro_schema(), Value::Record(fields))
        .map_err(|e| CodecError::Encoding(e.to_string()))
}

/// Inverse of [`encode`].
pub fn decode(bytes: &[u8], schema: &SchemaDescriptor) -> Result<NormalizedRecord> {
    let mut reader = bytes;
    let value = apache_avro::from_avro_datum(schema.avro_schema(), &mut reader, None)
        .map_err(|e| CodecError::Decoding(e.to_string()))?;

    if !reader.is_empty() {
        return Err(CodecError::Decoding(format!(
            "{} trailing bytes after datum",
            reader.len()
        )));
    }

    let Value::Record(avro_fields) = value else {
        return Err(CodecError::Decoding("datum is not a record".to_string()));
    };

    let fields = schema
        .fields()
        .iter()
        .zip(avro_fields)
        .map(|(descriptor, (name, value))| {
            from_avro(value)
                .map(|v| (name, v))
                .ok_or_else(|| {
                    CodecError::Decoding(format!("unexpected value for {}", descriptor.name))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NormalizedRecord::new(schema.id(), fields))
}

fn to_avro(descriptor: &FieldDescriptor, value: &FieldValue) -> std::result::Result<Value, String> {
    let inner = match (&descriptor.field_type, value) {
        (_, FieldValue::Null) if descriptor.nullable => {
            return Ok(Value::Union(0, Box::new(Value::Null)))
        }
        (FieldType::Int, FieldValue::Int(v)) => Value::Int(*v),
        (FieldType::Long, FieldValue::Long(v)) => Value::Long(*v),
        (FieldType::Double, FieldValue::Double(v)) => Value::Double(*v),
        (FieldType::String, FieldValue::String(v)) => Value::String(v.clone()),
        (FieldType::Enum { symbols }, FieldValue::Enum(symbol)) => {
            let index = symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| format!("{}: unknown symbol {symbol}", descriptor.name))?;
            Value::Enum(index as u32, symbol.clone())
        }
        (expected, found) => {
            return Err(format!(
                "{}: expected {}, got {found:?}",
                descriptor.name,
                expected.name()
            ))
        }
    };

    Ok(if descriptor.nullable {
        Value::Union(1, Box::new(inner))
    } else {
        inner
    })
}

fn from_avro(value: Value) -> Option<FieldValue> {
    match value {
        Value::Union(_, inner) => from_avro(*inner),
        Value::Null => Some(FieldValue::Null),
        Value::Int(v) => Some(FieldValue::Int(v)),
        Value::Long(v) => Some(FieldValue::Long(v)),
        Value::Double(v) => Some(FieldValue::Double(v)),
        Value::String(v) => Some(FieldValue::String(v)),
        Value::Enum(_, symbol) => Some(FieldValue::Enum(symbol)),
        _ => None,
    }
}
