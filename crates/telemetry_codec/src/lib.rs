mod avro;
mod error;
mod record;
mod registry;
mod schema;

pub use avro::{decode, encode};
pub use error::{CodecError, Result};
pub use record::{FieldValue, NormalizedRecord};
pub use registry::SchemaRegistry;
pub use schema::{FieldDescriptor, FieldType, SchemaDescriptor, SchemaId};
