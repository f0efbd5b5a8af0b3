use crate::domain::Channel;
use chrono::{DateTime, Utc};
use std::fmt;

pub const RAW_OBJECT_EXTENSION: &str = "bin";

/// Time-partitioned key of a raw object:
/// `<prefix>/<YYYY>/<MM>/<DD>/<HH>/<mm>/<epoch-ms>.bin`, in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn derive(channel: &Channel, received_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}/{}/{}.{}",
            channel.raw_prefix,
            received_at.format("%Y/%m/%d/%H/%M"),
            received_at.timestamp_millis(),
            RAW_OBJECT_EXTENSION
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A key read back from the metadata store.
impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
