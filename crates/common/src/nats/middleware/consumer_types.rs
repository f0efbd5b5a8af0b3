use crate::domain::ObjectKey;
use async_nats::HeaderMap;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One delivery, owned, as it flows through the consumer's Tower stack.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Carries W3C trace context when the publisher set it.
    pub headers: Option<HeaderMap>,
    pub delivered: i64,
    pub received_at: DateTime<Utc>,
}

impl ConsumeRequest {
    pub fn new(
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        delivered: i64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            payload,
            headers,
            delivered,
            received_at,
        }
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivered > 1
    }
}

/// Terminal state of a delivery. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Both the raw object and the metadata document were written.
    Persisted {
        object_key: ObjectKey,
        payload_len: usize,
    },
    /// Processing failed and a dead-letter record was written.
    Quarantined { reason: String },
    /// Processing failed and the dead-letter write failed too.
    Lost { reason: String, error: String },
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Persisted { .. } => "persisted",
            DeliveryOutcome::Quarantined { .. } => "quarantined",
            DeliveryOutcome::Lost { .. } => "lost",
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_request_new() {
        let now = Utc::now();
        let req = ConsumeRequest::new("iaq".to_string(), Bytes::from("{}"), None, 1, now);

        assert_eq!(req.subject, "iaq");
        assert_eq!(req.payload, Bytes::from("{}"));
        assert!(req.headers.is_none());
        assert_eq!(req.received_at, now);
        assert!(!req.is_redelivery());
    }

    #[test]
    fn test_redelivery_flag() {
        let req = ConsumeRequest::new("iaq".to_string(), Bytes::new(), None, 2, Utc::now());
        assert!(req.is_redelivery());
    }

    #[test]
    fn test_outcome_labels() {
        let quarantined = DeliveryOutcome::Quarantined {
            reason: "MissingField: ts".to_string(),
        };
        let lost = DeliveryOutcome::Lost {
            reason: "MissingField: ts".to_string(),
            error: "SinkUnavailable: dead_letter: timeout".to_string(),
        };

        assert_eq!(quarantined.label(), "quarantined");
        assert_eq!(lost.label(), "lost");
        assert!(!quarantined.is_persisted());
    }
}
