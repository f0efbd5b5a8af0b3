use crate::SchemaId;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Enum(String),
}

/// A record carrying exactly the fields of its schema, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    schema: SchemaId,
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    pub fn new(schema: SchemaId, fields: Vec<(String, FieldValue)>) -> Self {
        Self { schema, fields }
    }

    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
