use crate::SchemaId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no descriptor registered for schema {0}")]
    UnknownSchema(SchemaId),

    #[error("invalid descriptor for schema {schema}: {reason}")]
    InvalidDescriptor { schema: SchemaId, reason: String },

    #[error("failed to read descriptor {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("record does not match schema {schema}: {reason}")]
    SchemaMismatch { schema: SchemaId, reason: String },

    #[error("avro encoding failed: {0}")]
    Encoding(String),

    #[error("avro decoding failed: {0}")]
    Decoding(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
