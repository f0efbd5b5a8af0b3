use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure of one delivery. The `Display` form is the reason stored on dead-letter records.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("UnknownKind: {0}")]
    UnknownKind(String),

    #[error("MissingField: {0}")]
    MissingField(String),

    #[error("TypeMismatch: {field}: expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("InvalidPayload: {0}")]
    InvalidPayload(String),

    #[error("EncodingError: {0}")]
    Encoding(String),

    #[error("SinkUnavailable: {sink}: {source}")]
    SinkUnavailable {
        sink: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub fn sink_unavailable(sink: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::SinkUnavailable {
            sink,
            source: source.into(),
        }
    }

    /// Short machine-readable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UnknownKind(_) => "unknown_kind",
            IngestError::MissingField(_) => "missing_field",
            IngestError::TypeMismatch { .. } => "type_mismatch",
            IngestError::InvalidPayload(_) => "invalid_payload",
            IngestError::Encoding(_) => "encoding_error",
            IngestError::SinkUnavailable { .. } => "sink_unavailable",
        }
    }
}
