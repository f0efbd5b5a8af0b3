use crate::domain::{Channel, ChannelKind};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Quarantined delivery. Written once, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    /// Broker subject the delivery arrived on, so it can be replayed to its origin.
    pub subject: String,
    /// `None` when the subject is not in the channel table.
    pub kind: Option<ChannelKind>,
    pub error: String,
    /// The decoded input fields, or the lossily-decoded payload text when it was not JSON.
    pub raw: Value,
    pub received_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        subject: impl Into<String>,
        error: impl ToString,
        raw: Value,
        received_at: DateTime<Utc>,
    ) -> Self {
        let subject = subject.into();
        let kind = Channel::from_subject(&subject).ok().map(|channel| channel.kind);

        Self {
            subject,
            kind,
            error: error.to_string(),
            raw,
            received_at,
        }
    }
}
