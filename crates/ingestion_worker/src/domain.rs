mod ingestion_service;
mod normalizer;
mod redactor;

pub use ingestion_service::*;
pub use normalizer::*;
pub use redactor::*;
