mod ingest_delivery_service;

pub use ingest_delivery_service::*;
